//! Network-facing API used by protocol stacks.

use crate::sim::{SimTime, Simulator};

use super::{Envelope, NetEvent, Network, NodeId};

/// Minimal network API for protocol stacks.
///
/// TCP endpoints only see the clock, an envelope factory, a way to hand an
/// envelope to their local node, and a way to arm timers. Tests drive the
/// engines through a recording implementation of this trait.
pub trait NetApi {
    fn now(&self) -> SimTime;
    fn make_envelope(&mut self, src: NodeId, dst: NodeId, payload: Vec<u8>) -> Envelope;
    /// Returns false when the network has no route for the envelope.
    fn send_from(&mut self, from: NodeId, env: Envelope) -> bool;
    fn schedule(&mut self, at: SimTime, ev: NetEvent);
}

/// `NetApi` backed by the live simulator and network.
pub struct NetCtx<'a> {
    pub sim: &'a mut Simulator,
    pub net: &'a mut Network,
}

impl NetApi for NetCtx<'_> {
    fn now(&self) -> SimTime {
        self.sim.now()
    }

    fn make_envelope(&mut self, src: NodeId, dst: NodeId, payload: Vec<u8>) -> Envelope {
        self.net.make_envelope(src, dst, payload)
    }

    fn send_from(&mut self, from: NodeId, env: Envelope) -> bool {
        self.net.send_from(from, env, self.sim)
    }

    fn schedule(&mut self, at: SimTime, ev: NetEvent) {
        self.sim.schedule(at, ev);
    }
}
