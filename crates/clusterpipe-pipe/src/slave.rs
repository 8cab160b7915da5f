use std::sync::Arc;
use std::time::Duration;

use clusterpipe_packet::{Multiplexer, Packet, PipeId};
use clusterpipe_transport::ConstructionStage;
use tracing::{debug, info};

use crate::channel::ReplicationChannel;
use crate::config::{Coupling, PipeConfig};
use crate::endpoint::PipeEndpoint;
use crate::error::{construction_error, protocol_error, PipeError, PipeResult, WriteError};

/// A slave's end of a cluster pipe: no socket, only the master's broadcasts.
///
/// Read data is served straight out of the last received packet, which is
/// held until the next read and then handed back to the multiplexer.
#[derive(Debug)]
pub struct SlavePipe {
    channel: ReplicationChannel,
    coupling: Coupling,
    held: Option<Packet>,
}

impl SlavePipe {
    /// Wait for the master's construction status for this pipe.
    ///
    /// Fails with the same [`PipeError::Construction`] stage the master hit.
    pub fn attach(
        mux: Arc<dyn Multiplexer>,
        pipe_id: PipeId,
        host: &str,
        port: u16,
        config: &PipeConfig,
    ) -> PipeResult<Self> {
        let channel = ReplicationChannel::new(mux, pipe_id);
        match channel.receive_i32()? {
            0 => {}
            code => {
                let stage = ConstructionStage::from_code(code).ok_or_else(|| {
                    protocol_error(pipe_id, format!("unknown construction status {code}"))
                })?;
                debug!(%pipe_id, host, port, %stage, "mirroring construction failure");
                return Err(construction_error(stage, host, port));
            }
        }
        info!(%pipe_id, coupling = ?config.coupling, "slave pipe attached");
        Ok(Self {
            channel,
            coupling: config.coupling,
            held: None,
        })
    }

    fn release_held(&mut self) {
        if let Some(packet) = self.held.take() {
            self.channel.release(packet);
        }
    }
}

impl Drop for SlavePipe {
    fn drop(&mut self) {
        self.release_held();
    }
}

impl PipeEndpoint for SlavePipe {
    fn pipe_id(&self) -> PipeId {
        self.channel.pipe_id()
    }

    fn coupling(&self) -> Coupling {
        self.coupling
    }

    fn perform_read(&mut self) -> PipeResult<usize> {
        self.release_held();
        if !self.coupling.read {
            return Ok(0);
        }

        let packet = self.channel.receive()?;
        if !packet.is_empty() {
            let len = packet.len();
            debug!(pipe_id = %self.channel.pipe_id(), size = len, "replayed read");
            self.held = Some(packet);
            return Ok(len);
        }

        self.channel.release(packet);
        match self.channel.receive_i32()? {
            0 => Ok(0),
            code => Err(PipeError::Read { code }),
        }
    }

    fn read_buffer(&self) -> &[u8] {
        self.held.as_ref().map_or(&[][..], Packet::payload)
    }

    fn perform_write(&mut self, _data: &[u8]) -> PipeResult<()> {
        if !self.coupling.write {
            return Ok(());
        }
        let (error_type, code) = self.channel.receive_i32_pair()?;
        match WriteError::from_wire(error_type, code) {
            Ok(None) => Ok(()),
            Ok(Some(err)) => Err(err.into()),
            Err(unknown) => Err(protocol_error(
                self.channel.pipe_id(),
                format!("unknown write error type {unknown}"),
            )),
        }
    }

    fn wait_for_data(&mut self, _timeout: Option<Duration>) -> PipeResult<bool> {
        if !self.coupling.read {
            return Ok(true);
        }
        Ok(self.channel.receive_i32()? != 0)
    }

    fn shutdown(&mut self, _read: bool, _write: bool) {}

    fn local_port(&mut self) -> PipeResult<Option<u16>> {
        if !self.coupling.read {
            return Ok(None);
        }
        self.channel.receive_port()
    }

    fn local_address(&mut self) -> PipeResult<Option<String>> {
        if !self.coupling.read {
            return Ok(None);
        }
        self.channel.receive_text()
    }

    fn local_host_name(&mut self) -> PipeResult<Option<String>> {
        if !self.coupling.read {
            return Ok(None);
        }
        self.channel.receive_text()
    }

    fn peer_port(&mut self) -> PipeResult<Option<u16>> {
        if !self.coupling.read {
            return Ok(None);
        }
        self.channel.receive_port()
    }

    fn peer_address(&mut self) -> PipeResult<Option<String>> {
        if !self.coupling.read {
            return Ok(None);
        }
        self.channel.receive_text()
    }

    fn peer_host_name(&mut self) -> PipeResult<Option<String>> {
        if !self.coupling.read {
            return Ok(None);
        }
        self.channel.receive_text()
    }
}
