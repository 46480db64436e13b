//! In-process publish/subscribe used to decouple the session from its
//! consumers (menu, HUD). The bus is an explicitly constructed value owned by
//! whatever composes the session and the world; there is no global registry.

use shared::JoinGameAnswer;
use std::collections::HashMap;

/// Signals the session publishes for interested consumers.
#[derive(Debug, Clone)]
pub enum Signal {
    /// The transport finished opening; multiplayer actions may be enabled.
    ServerConnected,
    /// This session was elected authoritative for its room.
    RoomLeader,
    /// Answer to an earlier join or create request.
    JoinGame(JoinGameAnswer),
    /// The room leader started the match.
    StartGame,
    /// One raw latency sample in milliseconds. No smoothing is applied here.
    UpdatePing(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    ServerConnected,
    RoomLeader,
    JoinGame,
    StartGame,
    UpdatePing,
}

impl Signal {
    pub fn channel(&self) -> Channel {
        match self {
            Signal::ServerConnected => Channel::ServerConnected,
            Signal::RoomLeader => Channel::RoomLeader,
            Signal::JoinGame(_) => Channel::JoinGame,
            Signal::StartGame => Channel::StartGame,
            Signal::UpdatePing(_) => Channel::UpdatePing,
        }
    }
}

/// Handle returned by [`EventBus::on`] / [`EventBus::once`]. Closures have no
/// identity of their own, so unsubscription goes through this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    once: bool,
    handler: Box<dyn FnMut(&Signal)>,
}

#[derive(Default)]
pub struct EventBus {
    channels: HashMap<Channel, Vec<Subscriber>>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persistent subscription. Handlers on one channel run in subscription
    /// order; ordering across channels is unspecified.
    pub fn on<F>(&mut self, channel: Channel, handler: F) -> SubscriptionId
    where
        F: FnMut(&Signal) + 'static,
    {
        self.subscribe(channel, false, Box::new(handler))
    }

    /// Subscription that is removed after its first delivery.
    pub fn once<F>(&mut self, channel: Channel, handler: F) -> SubscriptionId
    where
        F: FnMut(&Signal) + 'static,
    {
        self.subscribe(channel, true, Box::new(handler))
    }

    fn subscribe(
        &mut self,
        channel: Channel,
        once: bool,
        handler: Box<dyn FnMut(&Signal)>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.channels.entry(channel).or_default().push(Subscriber {
            id,
            once,
            handler,
        });
        id
    }

    /// Removes a subscription. Returns whether anything was removed.
    pub fn off(&mut self, channel: Channel, id: SubscriptionId) -> bool {
        match self.channels.get_mut(&channel) {
            Some(subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|s| s.id != id);
                subscribers.len() != before
            }
            None => false,
        }
    }

    /// Synchronous fan-out to every current subscriber of the signal's
    /// channel, in subscription order. `once` subscribers are dropped after
    /// delivery.
    pub fn emit(&mut self, signal: &Signal) {
        if let Some(subscribers) = self.channels.get_mut(&signal.channel()) {
            for subscriber in subscribers.iter_mut() {
                (subscriber.handler)(signal);
            }
            subscribers.retain(|s| !s.once);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnMut(&Signal)>) {
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let log_for_make = Rc::clone(&log);
        let make = move |label: &str| -> Box<dyn FnMut(&Signal)> {
            let log = Rc::clone(&log_for_make);
            let label = label.to_string();
            Box::new(move |_signal| log.borrow_mut().push(label.clone()))
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let mut bus = EventBus::new();
        let (log, make) = recorder();
        bus.on(Channel::StartGame, make("first"));
        bus.on(Channel::StartGame, make("second"));
        bus.on(Channel::StartGame, make("third"));

        bus.emit(&Signal::StartGame);
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_once_unsubscribes_after_first_delivery() {
        let mut bus = EventBus::new();
        let (log, make) = recorder();
        bus.once(Channel::ServerConnected, make("once"));
        bus.on(Channel::ServerConnected, make("always"));

        bus.emit(&Signal::ServerConnected);
        bus.emit(&Signal::ServerConnected);
        assert_eq!(*log.borrow(), vec!["once", "always", "always"]);
    }

    #[test]
    fn test_off_removes_only_the_given_subscription() {
        let mut bus = EventBus::new();
        let (log, make) = recorder();
        let first = bus.on(Channel::UpdatePing, make("first"));
        bus.on(Channel::UpdatePing, make("second"));

        assert!(bus.off(Channel::UpdatePing, first));
        assert!(!bus.off(Channel::UpdatePing, first));

        bus.emit(&Signal::UpdatePing(16));
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn test_channels_are_isolated() {
        let mut bus = EventBus::new();
        let (log, make) = recorder();
        bus.on(Channel::StartGame, make("start"));
        bus.on(Channel::JoinGame, make("join"));

        bus.emit(&Signal::UpdatePing(5));
        assert!(log.borrow().is_empty());

        bus.emit(&Signal::JoinGame(JoinGameAnswer {
            ok: true,
            reason: None,
            code: None,
            player_type: None,
            spawn: None,
        }));
        assert_eq!(*log.borrow(), vec!["join"]);
    }

    #[test]
    fn test_handler_receives_the_signal_payload() {
        let mut bus = EventBus::new();
        let seen: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.on(Channel::UpdatePing, move |signal| {
            if let Signal::UpdatePing(ms) = signal {
                sink.borrow_mut().push(*ms);
            }
        });

        bus.emit(&Signal::UpdatePing(31));
        bus.emit(&Signal::UpdatePing(47));
        assert_eq!(*seen.borrow(), vec![31, 47]);
    }
}
