use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use clusterpipe::packet::{InMemoryCluster, Multiplexer};
use clusterpipe::pipe::ErrorKind;
use clusterpipe::{ClusterPipe, PipeConfig};

/// Accept `connections` clients and echo each one until it closes.
fn spawn_echo_server(connections: usize) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("listener has address").port();
    thread::spawn(move || {
        for _ in 0..connections {
            let (mut stream, _) = listener.accept().expect("accept should succeed");
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    port
}

/// The application every node runs: send lines, read the echo of each,
/// then report what it saw.
fn session(mux: Arc<dyn Multiplexer>, port: u16) -> Vec<String> {
    let mut pipe = ClusterPipe::connect(mux, "127.0.0.1", port, PipeConfig::default())
        .expect("pipe should open");
    let mut seen = Vec::new();
    for line in ["alpha\n", "bravo\n", "charlie\n"] {
        pipe.write(line.as_bytes()).expect("write should succeed");
        pipe.flush().expect("flush should succeed");
        let mut echoed = vec![0u8; line.len()];
        pipe.read_exact(&mut echoed).expect("echo should arrive");
        seen.push(String::from_utf8(echoed).expect("echo is utf8"));
    }
    seen.push(format!("{:?}", pipe.peer_port().expect("peer port")));
    seen.push(format!("{:?}", pipe.peer_address().expect("peer address")));
    seen
}

#[test]
fn concurrent_slaves_replay_the_master_session() {
    let port = spawn_echo_server(1);
    let cluster = InMemoryCluster::new(3, 16);

    let slaves: Vec<_> = cluster
        .slaves()
        .iter()
        .map(|node| {
            let node: Arc<dyn Multiplexer> = node.clone();
            thread::spawn(move || session(node, port))
        })
        .collect();
    let master = session(cluster.master(), port);

    assert_eq!(&master[..3], ["alpha\n", "bravo\n", "charlie\n"]);
    assert_eq!(master[3], format!("{:?}", Some(port)));
    for slave in slaves {
        assert_eq!(slave.join().expect("slave thread"), master);
    }
}

#[test]
fn many_pipes_replay_in_per_pipe_order() {
    let port = spawn_echo_server(4);
    let cluster = InMemoryCluster::new(1, 64);

    let run = move |mux: Arc<dyn Multiplexer>| -> Vec<Vec<u8>> {
        let mut pipes: Vec<ClusterPipe> = (0..4)
            .map(|_| {
                ClusterPipe::connect(mux.clone(), "127.0.0.1", port, PipeConfig::default())
                    .expect("pipe should open")
            })
            .collect();
        for (i, pipe) in pipes.iter_mut().enumerate() {
            pipe.write(format!("pipe-{i}").as_bytes()).unwrap();
            pipe.flush().unwrap();
        }
        // Read back in reverse so the slave consumes pipes out of the
        // order the master produced their packets.
        pipes
            .iter_mut()
            .rev()
            .map(|pipe| {
                let mut buf = vec![0u8; 6];
                pipe.read_exact(&mut buf).unwrap();
                buf
            })
            .collect()
    };

    let master = run(cluster.master());
    let slave_node: Arc<dyn Multiplexer> = cluster.slaves()[0].clone();
    let slave = thread::spawn(move || run(slave_node));
    let slave = slave.join().expect("slave thread");

    assert_eq!(master, slave);
    assert_eq!(master[0], b"pipe-3");
}

#[test]
fn refused_connection_fails_identically_everywhere() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let cluster = InMemoryCluster::new(2, 64);

    let errors: Vec<ErrorKind> = std::iter::once(cluster.master())
        .chain(cluster.slaves().iter().cloned())
        .map(|node| {
            ClusterPipe::connect(node, "127.0.0.1", port, PipeConfig::default())
                .expect_err("connection should be refused")
                .kind()
        })
        .collect();

    assert!(matches!(
        errors[0],
        ErrorKind::Construction(clusterpipe::pipe::ConstructionStage::Connect)
    ));
    assert!(errors.iter().all(|kind| *kind == errors[0]));
}

#[cfg(unix)]
#[test]
fn stream_multiplexer_carries_a_session_between_nodes() {
    use std::os::unix::net::UnixStream;

    use clusterpipe::packet::{StreamMultiplexer, StreamMultiplexerConfig};

    let port = spawn_echo_server(1);
    let (master_end, slave_end) = UnixStream::pair().expect("socket pair");
    let config = StreamMultiplexerConfig {
        packet_capacity: 32,
    };

    let slave_mux = StreamMultiplexer::slave(Box::new(slave_end), config.clone())
        .expect("slave multiplexer should start");
    let slave = thread::spawn(move || session(Arc::new(slave_mux), port));

    let sinks: Vec<Box<dyn Write + Send>> = vec![Box::new(master_end)];
    let master_mux: Arc<dyn Multiplexer> = Arc::new(StreamMultiplexer::master(sinks, config));
    let master = session(master_mux, port);

    assert_eq!(slave.join().expect("slave thread"), master);
}
