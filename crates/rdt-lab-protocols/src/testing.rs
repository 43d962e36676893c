use rdt_lab_abstract::{Message, Packet, SystemContext};

/// Context double that records every call an entity makes and enforces the
/// one-timer-per-entity contract.
#[derive(Default)]
pub struct RecordingContext {
    pub sent: Vec<Packet>,
    pub delivered: Vec<Message>,
    pub timer_starts: Vec<f64>,
    pub timer_stops: usize,
    pub timer_running: bool,
    pub logs: Vec<String>,
    pub now: f64,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets sent since the last call, leaving the history empty.
    pub fn take_sent(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.sent)
    }

    /// Simulate the timer firing: it is no longer running when the handler is invoked.
    pub fn fire_timer(&mut self) {
        assert!(self.timer_running, "timer fired while not running");
        self.timer_running = false;
    }
}

impl SystemContext for RecordingContext {
    fn start_timer(&mut self, duration: f64) {
        assert!(!self.timer_running, "timer started while already running");
        self.timer_running = true;
        self.timer_starts.push(duration);
    }

    fn stop_timer(&mut self) {
        if self.timer_running {
            self.timer_stops += 1;
        }
        self.timer_running = false;
    }

    fn to_layer3(&mut self, packet: Packet) {
        self.sent.push(packet);
    }

    fn to_layer5(&mut self, message: Message) {
        self.delivered.push(message);
    }

    fn get_time(&self) -> f64 {
        self.now
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }
}

pub fn msg(byte: u8) -> Message {
    Message::filled(byte)
}
