use tokio::sync::watch;

/// Snapshot container with a subscribe/notify contract.
///
/// Owners mutate their own state and call [`Observable::publish`] once per logical
/// update, so subscribers see batched snapshots rather than per-field changes.
#[derive(Debug)]
pub struct Observable<T> {
    sender: watch::Sender<T>,
    revision: u64,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender,
            revision: 0,
        }
    }

    /// Registers an observer; it starts with the current snapshot marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn publish(&mut self, snapshot: T) {
        // `send_replace` stores the value even while nobody is subscribed.
        self.sender.send_replace(snapshot);
        self.revision += 1;
    }

    pub fn current(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Number of snapshots published since creation.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
