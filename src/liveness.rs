//! Generic last-seen/timeout tracking for cluster entities.

/// Tracks the liveness of one entity against a fixed timeout.
///
/// [`has_timed_out`](Self::has_timed_out) is a pure function of the stored state and the supplied
/// timestamp; the tracker never reads a clock of its own. Once [`on_time_event`](Self::on_time_event)
/// observes a timeout, [`has_reached_end_of_life`](Self::has_reached_end_of_life) latches true and
/// never resets: a later keepalive only refreshes the timestamp, which is meaningless after the
/// latch. The latch is a one-way terminal signal consumed exactly once by the owner.
pub struct Liveness<Id> {
    entity_id: Id,
    timeout_ns: u64,
    last_keep_alive_ns: u64,
    reached_end_of_life: bool,
}

impl<Id> Liveness<Id> {
    /// Constructs a tracker for `entity_id`, treating `now_ns` as its first sighting.
    pub fn new(entity_id: Id, timeout_ns: u64, now_ns: u64) -> Self {
        Self {
            entity_id,
            timeout_ns,
            last_keep_alive_ns: now_ns,
            reached_end_of_life: false,
        }
    }

    /// Returns the tracked entity's id.
    pub fn entity_id(&self) -> &Id {
        &self.entity_id
    }

    /// Returns the timestamp of the last keepalive.
    pub fn last_keep_alive(&self) -> u64 {
        self.last_keep_alive_ns
    }

    /// Records a sighting of the entity at `now_ns`.
    pub fn keep_alive(&mut self, now_ns: u64) {
        self.last_keep_alive_ns = now_ns;
    }

    /// Returns whether the entity has been silent for longer than its timeout as of `now_ns`.
    pub fn has_timed_out(&self, now_ns: u64) -> bool {
        now_ns > self.last_keep_alive_ns.saturating_add(self.timeout_ns)
    }

    /// Latches end-of-life if the entity has timed out as of `now_ns`.
    pub fn on_time_event(&mut self, now_ns: u64) {
        if self.has_timed_out(now_ns) {
            self.reached_end_of_life = true;
        }
    }

    /// Returns whether end-of-life has been latched.
    pub fn has_reached_end_of_life(&self) -> bool {
        self.reached_end_of_life
    }
}
