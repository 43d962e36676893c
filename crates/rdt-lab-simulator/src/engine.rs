use crate::trace::SimulationReport;
use rand::Rng;
use rdt_lab_abstract::{ConfigError, MSG_SIZE, Message, Packet, ProtocolError, SimConfig};
use rdt_lab_abstract::{SystemContext, TransportEntity};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }
}

/// Fatal conditions that abort a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("{node:?} started a timer at t={time:.2} while one was already running")]
    TimerAlreadyRunning { node: NodeId, time: f64 },

    #[error("{node:?} violated its contract at t={time:.2}")]
    Protocol {
        node: NodeId,
        time: f64,
        #[source]
        source: ProtocolError,
    },

    #[error("invalid simulation settings: {0}")]
    InvalidConfig(#[from] ConfigError),
}

#[derive(Debug)]
pub enum EventType {
    PacketArrival { to: NodeId, packet: Packet },
    TimerExpiry { node: NodeId, generation: u64 },
    AppSend { message: Message },
}

#[derive(Debug)]
struct Event {
    time: f64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of important link-layer events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: f64,
    pub description: String,
}

/// One call an entity made on its context, kept in call order.
enum Action {
    ToLayer3(Packet),
    ToLayer5(Message),
    StartTimer(f64),
    StopTimer,
    Log(String),
}

/// Actions buffered during an entity callback
#[derive(Default)]
struct ActionBuffer {
    actions: Vec<Action>,
}

/// Context implementation passed to an entity
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: f64,
}

impl SystemContext for ScopedContext<'_> {
    fn start_timer(&mut self, duration: f64) {
        self.buffer.actions.push(Action::StartTimer(duration));
    }

    fn stop_timer(&mut self) {
        self.buffer.actions.push(Action::StopTimer);
    }

    fn to_layer3(&mut self, packet: Packet) {
        self.buffer.actions.push(Action::ToLayer3(packet));
    }

    fn to_layer5(&mut self, message: Message) {
        self.buffer.actions.push(Action::ToLayer5(message));
    }

    fn get_time(&self) -> f64 {
        self.now
    }

    fn log(&mut self, message: &str) {
        self.buffer.actions.push(Action::Log(message.to_string()));
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TimerSlot {
    running: bool,
    /// Bumped on every stop so expiries scheduled before it are ignored.
    generation: u64,
}

pub struct Simulator {
    time: f64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    rng: rand::rngs::StdRng,

    pub sender: Box<dyn TransportEntity>,
    pub receiver: Box<dyn TransportEntity>,

    /// Messages the application produced but the sender cannot take yet.
    app_backlog: VecDeque<Message>,

    // Stats for the report
    pub submitted: Vec<Message>,
    pub delivered: Vec<Message>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    pub sender_timeouts: u32,

    timers: HashMap<NodeId, TimerSlot>,
    /// Latest scheduled arrival per destination; keeps each direction FIFO.
    last_arrival: HashMap<NodeId, f64>,

    // Deterministic fault injection, each entry consumed by its first match
    drop_sender_seq_once: Vec<u32>,
    drop_receiver_ack_once: Vec<u32>,
    corrupt_sender_seq_once: Vec<u32>,
    corrupt_receiver_ack_once: Vec<u32>,

    /// Timeline of link events (drops, corruptions, sends, deliveries).
    pub link_events: Vec<LinkEventSummary>,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        sender: Box<dyn TransportEntity>,
        receiver: Box<dyn TransportEntity>,
    ) -> Result<Self, SimError> {
        use rand::SeedableRng;
        config.validate()?;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Ok(Self {
            time: 0.0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            rng,
            sender,
            receiver,
            app_backlog: VecDeque::new(),
            submitted: Vec::new(),
            delivered: Vec::new(),
            sender_packet_count: 0,
            receiver_packet_count: 0,
            sender_timeouts: 0,
            timers: HashMap::new(),
            last_arrival: HashMap::new(),
            drop_sender_seq_once: Vec::new(),
            drop_receiver_ack_once: Vec::new(),
            corrupt_sender_seq_once: Vec::new(),
            corrupt_receiver_ack_once: Vec::new(),
            link_events: Vec::new(),
        })
    }

    /// Register a deterministic fault: drop the first packet sent by Sender whose seqnum equals `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: u32) {
        self.drop_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: drop the first reply sent by Receiver whose acknum equals `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: u32) {
        self.drop_receiver_ack_once.push(ack);
    }

    /// Register a deterministic fault: corrupt the first packet sent by Sender whose seqnum equals `seq`.
    pub fn add_corrupt_sender_seq_once(&mut self, seq: u32) {
        self.corrupt_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: corrupt the first reply sent by Receiver whose acknum equals `ack`.
    pub fn add_corrupt_receiver_ack_once(&mut self, ack: u32) {
        self.corrupt_receiver_ack_once.push(ack);
    }

    fn push_event(&mut self, time: f64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    pub fn schedule_app_send(&mut self, time: f64, message: Message) {
        self.push_event(time, EventType::AppSend { message });
    }

    /// Schedule `count` generated messages starting at the current time.
    /// Message `i` is `MSG_SIZE` copies of `'a' + i % 26`; gaps are uniform in
    /// `[0, 2 * mean_interval]`.
    pub fn schedule_message_stream(&mut self, count: u32, mean_interval: f64) -> Result<(), SimError> {
        if !(mean_interval.is_finite() && mean_interval >= 0.0) {
            return Err(ConfigError::InvalidInterval(mean_interval).into());
        }
        let mut at = self.time;
        for i in 0..count {
            at += self.rng.random_range(0.0..=2.0 * mean_interval);
            let letter = b'a' + (i % 26) as u8;
            self.schedule_app_send(at, Message::filled(letter));
        }
        Ok(())
    }

    /// Hand a message to the sender right now, bypassing application back-pressure.
    pub fn send_now(&mut self, message: Message) -> Result<(), SimError> {
        self.submitted.push(message);
        self.dispatch(NodeId::Sender, |entity, ctx| entity.send(ctx, message))
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.app_backlog.len()
    }

    pub fn timer_running(&self, node: NodeId) -> bool {
        self.timers.get(&node).is_some_and(|slot| slot.running)
    }

    /// Process the next event. Returns `Ok(true)` if an event was processed,
    /// `Ok(false)` once the queue is empty or the time limit is reached.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return Ok(false),
        };

        if let Some(limit) = self.config.time_limit
            && event.time > limit
        {
            info!("Time limit {:.2} reached, stopping", limit);
            self.event_queue.clear();
            return Ok(false);
        }

        self.time = event.time;
        debug!("Processing event at {:.2}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::PacketArrival { to, packet } => {
                self.dispatch(to, |entity, ctx| {
                    entity.recv(ctx, packet);
                    Ok(())
                })?;
            }
            EventType::TimerExpiry { node, generation } => {
                let slot = self.timers.entry(node).or_default();
                if !slot.running || slot.generation != generation {
                    debug!("Skipping cancelled timer event for {:?}", node);
                    return Ok(true);
                }
                slot.running = false;

                if node == NodeId::Sender {
                    self.sender_timeouts += 1;
                }
                self.link_events.push(LinkEventSummary {
                    time: self.time,
                    description: format!("[{:?}] TIMEOUT", node),
                });
                self.dispatch(node, |entity, ctx| {
                    entity.timer_interrupt(ctx);
                    Ok(())
                })?;
            }
            EventType::AppSend { message } => {
                self.submitted.push(message);
                self.app_backlog.push_back(message);
            }
        }

        self.drain_backlog()?;
        Ok(true)
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration: self.time,
            submitted: self.submitted.clone(),
            delivered: self.delivered.clone(),
            sender_packet_count: self.sender_packet_count,
            receiver_packet_count: self.receiver_packet_count,
            sender_timeouts: self.sender_timeouts,
            link_events: self.link_events.clone(),
        }
    }

    pub fn run_until_complete(&mut self) -> Result<(), SimError> {
        while self.step()? {}
        Ok(())
    }

    /// Feed queued application messages to the sender while it has room.
    fn drain_backlog(&mut self) -> Result<(), SimError> {
        while self.sender.can_send() {
            let Some(message) = self.app_backlog.pop_front() else {
                break;
            };
            self.dispatch(NodeId::Sender, |entity, ctx| entity.send(ctx, message))?;
        }
        Ok(())
    }

    /// Run one entity callback, then apply what it asked for.
    fn dispatch<F>(&mut self, node: NodeId, callback: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut dyn TransportEntity, &mut dyn SystemContext) -> Result<(), ProtocolError>,
    {
        let mut buffer = ActionBuffer::default();
        let result = {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            let entity = match node {
                NodeId::Sender => self.sender.as_mut(),
                NodeId::Receiver => self.receiver.as_mut(),
            };
            callback(entity, &mut ctx)
        };
        self.process_actions(node, buffer)?;
        result.map_err(|source| SimError::Protocol {
            node,
            time: self.time,
            source,
        })
    }

    fn process_actions(&mut self, source_node: NodeId, buffer: ActionBuffer) -> Result<(), SimError> {
        for action in buffer.actions {
            match action {
                Action::Log(log) => {
                    info!("[{:?}] {}", source_node, log);
                }
                Action::ToLayer5(message) => {
                    info!("[{:?}] DELIVERED {}", source_node, message);
                    self.link_events.push(LinkEventSummary {
                        time: self.time,
                        description: format!("[{:?}] DELIVERED {} to application", source_node, message),
                    });
                    self.delivered.push(message);
                }
                Action::StartTimer(duration) => {
                    let slot = self.timers.entry(source_node).or_default();
                    if slot.running {
                        return Err(SimError::TimerAlreadyRunning {
                            node: source_node,
                            time: self.time,
                        });
                    }
                    slot.running = true;
                    let generation = slot.generation;
                    self.push_event(
                        self.time + duration,
                        EventType::TimerExpiry {
                            node: source_node,
                            generation,
                        },
                    );
                }
                Action::StopTimer => {
                    let slot = self.timers.entry(source_node).or_default();
                    if slot.running {
                        slot.running = false;
                        slot.generation += 1;
                    }
                }
                Action::ToLayer3(packet) => self.transmit(source_node, packet),
            }
        }
        Ok(())
    }

    /// Channel: count, apply faults, pick a latency and schedule arrival at the peer.
    fn transmit(&mut self, source_node: NodeId, mut packet: Packet) {
        let target_node = source_node.peer();
        let route = format!("[{:?}->{:?}]", source_node, target_node);

        let (drop_once, corrupt_once, key) = match source_node {
            NodeId::Sender => {
                self.sender_packet_count += 1;
                (
                    &mut self.drop_sender_seq_once,
                    &mut self.corrupt_sender_seq_once,
                    packet.seqnum,
                )
            }
            NodeId::Receiver => {
                self.receiver_packet_count += 1;
                (
                    &mut self.drop_receiver_ack_once,
                    &mut self.corrupt_receiver_ack_once,
                    packet.acknum,
                )
            }
        };
        let forced_drop = take_first(drop_once, key);
        let forced_corrupt = take_first(corrupt_once, key);

        if forced_drop {
            debug!("Deterministically dropping packet {}", packet);
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "{route} DROP (deterministic) seq={} ack={}",
                    packet.seqnum, packet.acknum
                ),
            });
            return;
        }

        // 1. Check Loss
        if self.rng.random::<f64>() < self.config.loss_rate {
            debug!("Packet lost in channel");
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "{route} DROP (random loss) seq={} ack={}",
                    packet.seqnum, packet.acknum
                ),
            });
            return;
        }

        // 2. Check Corruption
        if forced_corrupt || self.rng.random::<f64>() < self.config.corrupt_rate {
            debug!("Packet corrupted in channel");
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "{route} CORRUPT seq={} ack={}",
                    packet.seqnum, packet.acknum
                ),
            });
            self.corrupt(&mut packet);
        }

        // 3. Calculate Latency, never overtaking an earlier packet in the same direction
        let latency = self
            .rng
            .random_range(self.config.min_latency..=self.config.max_latency);
        let previous = self.last_arrival.get(&target_node).copied().unwrap_or(0.0);
        let arrival_time = (self.time + latency).max(previous);
        self.last_arrival.insert(target_node, arrival_time);

        self.link_events.push(LinkEventSummary {
            time: self.time,
            description: format!(
                "{route} SEND seq={} ack={} (arrives at {:.2})",
                packet.seqnum, packet.acknum, arrival_time
            ),
        });

        self.push_event(
            arrival_time,
            EventType::PacketArrival {
                to: target_node,
                packet,
            },
        );
    }

    /// Flip one bit: in the payload most of the time, otherwise in a header field.
    fn corrupt(&mut self, packet: &mut Packet) {
        let roll = self.rng.random::<f64>();
        if roll < 0.75 {
            let byte = self.rng.random_range(0..MSG_SIZE);
            packet.payload[byte] ^= 1 << self.rng.random_range(0..8);
        } else if roll < 0.875 {
            packet.seqnum ^= 1 << self.rng.random_range(0..16);
        } else {
            packet.acknum ^= 1 << self.rng.random_range(0..16);
        }
    }
}

fn take_first(pending: &mut Vec<u32>, key: u32) -> bool {
    match pending.iter().position(|k| *k == key) {
        Some(pos) => {
            pending.remove(pos);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeId, SimError, Simulator};
    use rdt_lab_abstract::{
        ConfigError, Message, Packet, ProtocolError, SimConfig, SystemContext, TransportEntity,
    };

    /// Sender that arms a timer on every send, exercising the single-timer contract.
    struct EagerTimerSender {
        fired: u32,
        stop_first: bool,
    }

    impl TransportEntity for EagerTimerSender {
        fn can_send(&self) -> bool {
            true
        }

        fn send(&mut self, ctx: &mut dyn SystemContext, message: Message) -> Result<(), ProtocolError> {
            if self.stop_first {
                ctx.stop_timer();
            }
            ctx.to_layer3(Packet::data(0, 0, &message));
            ctx.start_timer(10.0);
            Ok(())
        }

        fn recv(&mut self, _ctx: &mut dyn SystemContext, _packet: Packet) {}

        fn timer_interrupt(&mut self, _ctx: &mut dyn SystemContext) {
            self.fired += 1;
        }
    }

    struct SilentReceiver;

    impl TransportEntity for SilentReceiver {
        fn send(&mut self, _ctx: &mut dyn SystemContext, _message: Message) -> Result<(), ProtocolError> {
            Err(ProtocolError::SendOnReceiver)
        }

        fn recv(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
            ctx.to_layer5(packet.message());
        }

        fn timer_interrupt(&mut self, _ctx: &mut dyn SystemContext) {}
    }

    fn sim(stop_first: bool) -> Simulator {
        let config = SimConfig {
            min_latency: 1.0,
            max_latency: 1.0,
            ..Default::default()
        };
        Simulator::new(
            config,
            Box::new(EagerTimerSender {
                fired: 0,
                stop_first,
            }),
            Box::new(SilentReceiver),
        )
        .unwrap()
    }

    #[test]
    fn starting_a_running_timer_aborts_the_run() {
        let mut simulator = sim(false);
        simulator.schedule_app_send(0.0, Message::filled(b'a'));
        simulator.schedule_app_send(1.0, Message::filled(b'b'));

        let err = simulator.run_until_complete().unwrap_err();
        assert!(matches!(
            err,
            SimError::TimerAlreadyRunning {
                node: NodeId::Sender,
                ..
            }
        ));
    }

    #[test]
    fn stopped_timer_never_fires() {
        let mut simulator = sim(true);
        simulator.schedule_app_send(0.0, Message::filled(b'a'));
        simulator.schedule_app_send(5.0, Message::filled(b'b'));
        simulator.run_until_complete().unwrap();

        // first timer cancelled at t=5, second fires at t=15
        assert_eq!(simulator.sender_timeouts, 1);
        assert_eq!(simulator.current_time(), 15.0);
        assert!(!simulator.timer_running(NodeId::Sender));
    }

    #[test]
    fn receiver_send_is_a_fatal_contract_violation() {
        let mut simulator = sim(true);
        let err = simulator
            .dispatch(NodeId::Receiver, |entity, ctx| {
                entity.send(ctx, Message::filled(b'x'))
            })
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::Protocol {
                node: NodeId::Receiver,
                source: ProtocolError::SendOnReceiver,
                ..
            }
        ));
    }

    #[test]
    fn channel_preserves_order_with_random_latency() {
        let config = SimConfig {
            min_latency: 1.0,
            max_latency: 50.0,
            seed: 7,
            ..Default::default()
        };
        let mut simulator = Simulator::new(
            config,
            Box::new(EagerTimerSender {
                fired: 0,
                stop_first: true,
            }),
            Box::new(SilentReceiver),
        )
        .unwrap();
        for i in 0..20u8 {
            simulator.schedule_app_send(i as f64 * 0.5, Message::filled(b'a' + i));
        }
        simulator.run_until_complete().unwrap();

        let expected: Vec<Message> = (0..20u8).map(|i| Message::filled(b'a' + i)).collect();
        assert_eq!(simulator.delivered, expected);
    }

    #[test]
    fn deterministic_drop_consumes_one_match() {
        let mut simulator = sim(true);
        simulator.add_drop_sender_seq_once(0);
        simulator.schedule_app_send(0.0, Message::filled(b'a'));
        simulator.schedule_app_send(2.0, Message::filled(b'b'));
        simulator.run_until_complete().unwrap();

        assert_eq!(simulator.sender_packet_count, 2);
        assert_eq!(simulator.delivered, vec![Message::filled(b'b')]);
    }

    #[test]
    fn time_limit_stops_the_run() {
        let mut simulator = Simulator::new(
            SimConfig {
                time_limit: Some(3.0),
                ..Default::default()
            },
            Box::new(EagerTimerSender {
                fired: 0,
                stop_first: true,
            }),
            Box::new(SilentReceiver),
        )
        .unwrap();
        simulator.schedule_app_send(1.0, Message::filled(b'a'));
        simulator.schedule_app_send(5.0, Message::filled(b'b'));
        simulator.run_until_complete().unwrap();

        assert_eq!(simulator.submitted.len(), 1);
        assert_eq!(simulator.remaining_events(), 0);
    }

    #[test]
    fn inverted_latency_range_is_rejected_up_front() {
        let config = SimConfig {
            min_latency: 10.0,
            max_latency: 1.0,
            ..Default::default()
        };
        let err = Simulator::new(
            config,
            Box::new(EagerTimerSender {
                fired: 0,
                stop_first: true,
            }),
            Box::new(SilentReceiver),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            SimError::InvalidConfig(ConfigError::InvalidLatency { .. })
        ));
    }

    #[test]
    fn negative_stream_interval_is_rejected() {
        let mut simulator = sim(true);
        let err = simulator.schedule_message_stream(3, -1.0).unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidConfig(ConfigError::InvalidInterval(_))
        ));
        assert_eq!(simulator.remaining_events(), 0);

        simulator.schedule_message_stream(3, 0.0).unwrap();
        assert_eq!(simulator.remaining_events(), 3);
    }
}
