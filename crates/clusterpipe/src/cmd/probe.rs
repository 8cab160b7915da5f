use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clusterpipe_packet::{InMemoryCluster, Multiplexer, PipeId};
use clusterpipe_pipe::{ClusterPipe, PipeConfig, PipeResult};

use crate::cmd::ProbeArgs;
use crate::exit::{io_error, pipe_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, USAGE};
use crate::output::{payload_preview, print_probe, NodeReport, OutputFormat};

const REPLY_BUFFER_SIZE: usize = 64 * 1024;

/// What a node saw during one probe exchange.
#[derive(Debug, PartialEq, Eq)]
struct Exchange {
    ready: bool,
    reply: Vec<u8>,
    peer_address: Option<String>,
    peer_port: Option<u16>,
}

struct NodeRun {
    name: String,
    is_master: bool,
    pipe_id: Option<PipeId>,
    result: PipeResult<Exchange>,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let config = PipeConfig::default().with_coupling(args.coupling.into());
    let cluster = InMemoryCluster::new(args.slaves, args.packet_capacity);

    tracing::info!(
        host = %args.host,
        port = args.port,
        slaves = args.slaves,
        coupling = ?config.coupling,
        "starting probe"
    );

    let (master, slaves) = thread::scope(|scope| -> CliResult<(NodeRun, Vec<NodeRun>)> {
        let mut handles = Vec::with_capacity(cluster.num_slaves());
        for (index, node) in cluster.slaves().iter().enumerate() {
            let name = format!("slave-{index}");
            let node: Arc<dyn Multiplexer> = node.clone();
            let (args, config) = (&args, &config);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn_scoped(scope, move || run_node(name, node, args, config, timeout));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Wake the slaves already started so the scope can end.
                    cluster.close();
                    return Err(io_error("failed to start slave thread", err));
                }
            }
        }

        let master = run_node("master".to_string(), cluster.master(), &args, &config, timeout);
        // Slaves that try to replay more than the master produced fail
        // instead of blocking.
        cluster.close();

        let slaves = handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| CliError::new(INTERNAL, "slave thread panicked"))
            })
            .collect::<CliResult<Vec<_>>>()?;
        Ok((master, slaves))
    })?;

    let reports: Vec<NodeReport> = std::iter::once(&master)
        .chain(&slaves)
        .map(|node| report(node, &master))
        .collect();
    print_probe(&args.host, args.port, &reports, format);

    let diverged: Vec<&str> = slaves
        .iter()
        .filter(|node| !same_outcome(&node.result, &master.result))
        .map(|node| node.name.as_str())
        .collect();
    if !diverged.is_empty() {
        return Err(CliError::new(
            FAILURE,
            format!("replicas diverged from the master: {}", diverged.join(", ")),
        ));
    }

    match master.result {
        Ok(_) => Ok(SUCCESS),
        Err(err) => Err(pipe_error("probe failed", err)),
    }
}

fn run_node(
    name: String,
    mux: Arc<dyn Multiplexer>,
    args: &ProbeArgs,
    config: &PipeConfig,
    timeout: Duration,
) -> NodeRun {
    let is_master = mux.is_master();
    let _span = tracing::info_span!("node", name = %name, master = is_master).entered();
    let mut pipe_id = None;
    let result = ClusterPipe::connect(mux, &args.host, args.port, config.clone()).and_then(
        |mut pipe| {
            pipe_id = Some(pipe.pipe_id());
            exchange(&mut pipe, args.data.as_bytes(), timeout)
        },
    );

    match &result {
        Ok(exchange) => tracing::debug!(
            node = %name,
            ready = exchange.ready,
            size = exchange.reply.len(),
            "probe exchange complete"
        ),
        Err(err) => tracing::warn!(node = %name, error = %err, "probe exchange failed"),
    }

    NodeRun {
        name,
        is_master,
        pipe_id,
        result,
    }
}

fn exchange(pipe: &mut ClusterPipe, data: &[u8], timeout: Duration) -> PipeResult<Exchange> {
    pipe.write(data)?;
    pipe.flush()?;

    let ready = pipe.wait_for_data_timeout(timeout)?;
    let mut reply = Vec::new();
    if ready {
        let mut buf = vec![0u8; REPLY_BUFFER_SIZE];
        let n = pipe.read(&mut buf)?;
        reply.extend_from_slice(&buf[..n]);
    }

    Ok(Exchange {
        ready,
        reply,
        peer_address: pipe.peer_address()?,
        peer_port: pipe.peer_port()?,
    })
}

/// Channel failures are local to a node, so two of them never count as the
/// same outcome.
fn same_outcome(a: &PipeResult<Exchange>, b: &PipeResult<Exchange>) -> bool {
    match (a, b) {
        (Ok(a), Ok(b)) => a == b,
        (Err(a), Err(b)) => a.is_replicated() && a.kind() == b.kind(),
        _ => false,
    }
}

fn report(node: &NodeRun, master: &NodeRun) -> NodeReport {
    let (outcome, exchange) = match &node.result {
        Ok(exchange) => ("ok".to_string(), Some(exchange)),
        Err(err) => (err.to_string(), None),
    };
    let reply = exchange.map_or(&[][..], |exchange| exchange.reply.as_slice());

    NodeReport {
        node: node.name.clone(),
        role: if node.is_master { "master" } else { "slave" },
        pipe_id: node.pipe_id.map(PipeId::get),
        outcome,
        ready: exchange.map(|exchange| exchange.ready),
        reply_size: reply.len(),
        reply: payload_preview(reply),
        peer_address: exchange.and_then(|exchange| exchange.peer_address.clone()),
        peer_port: exchange.and_then(|exchange| exchange.peer_port),
        matches_master: same_outcome(&node.result, &master.result),
    }
}

fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
