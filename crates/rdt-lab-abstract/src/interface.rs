use crate::error::ProtocolError;
use crate::packet::{Message, Packet};

/// The capability provided by the simulator to a transport entity.
/// One context is scoped to a single entity and a single callback.
pub trait SystemContext {
    /// Arm this entity's retransmission timer to fire after `duration` time units.
    /// At most one timer may run per entity; starting a second one aborts the run.
    fn start_timer(&mut self, duration: f64);

    /// Cancel this entity's running timer. No-op when none is running.
    fn stop_timer(&mut self);

    /// Hand a packet to the unreliable channel for delivery to the peer entity.
    fn to_layer3(&mut self, packet: Packet);

    /// Deliver a payload upward to the application.
    fn to_layer5(&mut self, message: Message);

    /// Current simulated time. Diagnostics only.
    fn get_time(&self) -> f64;

    /// Log a message to the simulator's debug output.
    fn log(&mut self, message: &str);
}

/// A reactive transport-layer state machine driven by the simulator.
pub trait TransportEntity {
    /// Whether `send` may be called right now without violating the entity's
    /// outstanding-capacity contract.
    fn can_send(&self) -> bool {
        false
    }

    /// Called when the application has a message to transmit.
    fn send(&mut self, ctx: &mut dyn SystemContext, message: Message) -> Result<(), ProtocolError>;

    /// Called on every packet arrival from the channel, valid or corrupted.
    fn recv(&mut self, ctx: &mut dyn SystemContext, packet: Packet);

    /// Called when this entity's timer expires.
    fn timer_interrupt(&mut self, ctx: &mut dyn SystemContext);
}
