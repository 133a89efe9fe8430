//! Event channel between state nodes and the machine.
//!
//! Nodes emit into an [`EventSink`]. At the top level the sink is the
//! machine's [`Listener`], which folds each event into the context before
//! the emitting phase continues and then publishes it on a broadcast feed.
//! Children of a block run concurrently against a shared, read-only context
//! and emit into a [`Forwarder`]; their events travel down an `mpsc`
//! channel and are folded by the parent once every child has settled.

use ayatori_core::{Context, EventSink, LifecycleEvent};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Default capacity of the broadcast feed.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Broadcast feed of lifecycle events for external observers.
///
/// Attached when the machine is built and detached by `finish()`. Once
/// detached, nothing is published and subscribers see the feed close.
#[derive(Debug)]
pub struct EventChannel {
    sender: Option<broadcast::Sender<LifecycleEvent>>,
}

impl EventChannel {
    /// Creates an attached channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Some(sender),
        }
    }

    /// Subscribes to every future event.
    ///
    /// A subscription taken after detaching is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        match &self.sender {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Publishes an event. A no-op without subscribers or once detached.
    pub fn publish(&self, event: &LifecycleEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event.clone());
        }
    }

    /// Returns `true` until [`detach`](Self::detach) is called.
    pub fn is_attached(&self) -> bool {
        self.sender.is_some()
    }

    /// Detaches the channel. Returns `false` if it was already detached.
    pub fn detach(&mut self) -> bool {
        self.sender.take().is_some()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// The machine's listener: the only writer of the context.
pub(crate) struct Listener<'a> {
    context: &'a mut Context,
    channel: &'a EventChannel,
}

impl<'a> Listener<'a> {
    pub(crate) fn new(context: &'a mut Context, channel: &'a EventChannel) -> Self {
        Self { context, channel }
    }
}

impl EventSink for Listener<'_> {
    fn context(&self) -> &Context {
        self.context
    }

    fn emit(&mut self, event: LifecycleEvent) {
        if !self.channel.is_attached() {
            return;
        }
        debug!(state = %event.state, event = %event.key, "Lifecycle event");
        self.context.apply(&event);
        self.channel.publish(&event);
    }
}

/// Sink of a block child: queues events for the parent to fold.
pub(crate) struct Forwarder<'a> {
    context: &'a Context,
    queue: mpsc::UnboundedSender<LifecycleEvent>,
}

impl<'a> Forwarder<'a> {
    pub(crate) fn new(context: &'a Context, queue: mpsc::UnboundedSender<LifecycleEvent>) -> Self {
        Self { context, queue }
    }
}

impl EventSink for Forwarder<'_> {
    fn context(&self) -> &Context {
        self.context
    }

    fn emit(&mut self, event: LifecycleEvent) {
        // The receiver lives until every child has settled.
        let _ = self.queue.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayatori_core::{ActionStatus, Phase, StateName};

    fn prepared() -> Context {
        Context::new()
            .prepare([&StateName::new("Start")])
            .unwrap()
    }

    #[tokio::test]
    async fn test_listener_folds_and_publishes() {
        let channel = EventChannel::default();
        let mut rx = channel.subscribe();
        let mut context = prepared();

        let mut listener = Listener::new(&mut context, &channel);
        listener.emit(LifecycleEvent::starting(StateName::new("Start"), Phase::Action));

        assert_eq!(context.status("Start"), Some(ActionStatus::Starting));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.key.to_string(), "Action:Starting");
    }

    #[tokio::test]
    async fn test_detached_listener_is_inert() {
        let mut channel = EventChannel::default();
        let mut rx = channel.subscribe();
        assert!(channel.detach());
        assert!(!channel.detach());

        let mut context = prepared();
        let mut listener = Listener::new(&mut context, &channel);
        listener.emit(LifecycleEvent::starting(StateName::new("Start"), Phase::Action));

        assert_eq!(context.status("Start"), Some(ActionStatus::Pending));
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_subscribe_after_detach_is_closed() {
        let mut channel = EventChannel::default();
        channel.detach();

        let mut rx = channel.subscribe();
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn test_forwarder_queues_in_order() {
        let context = prepared();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut forwarder = Forwarder::new(&context, tx);

        forwarder.emit(LifecycleEvent::starting(StateName::new("Start"), Phase::Action));
        forwarder.emit(LifecycleEvent::finished(StateName::new("Start"), Phase::Action));

        let keys: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.key.to_string())
            .collect();
        assert_eq!(keys, vec!["Action:Starting", "Action:Finished"]);
        assert_eq!(context.status("Start"), Some(ActionStatus::Pending));
    }
}
