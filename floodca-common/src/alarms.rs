/*
Fixed-size latch-bit vector, grounded on CADDIES2D.cpp's
`OUTFALARMS`/`VELALARMS` usage: `deactivateAll(); set();` runs once before
a batch of stencils, the stencils OR bits to true as they run, then
`get()` materialises the result for `isActivated` to read.
*/

/// A fixed-size set of latch bits. Stencils may only activate (OR to
/// true) a bit during a cycle; only `deactivateAll` can clear one, and
/// only at the start of the next `deactivateAll; set; ...; get` cycle.
#[derive(Clone, Debug)]
pub struct Alarms {
    pending: Vec<bool>,
    latched: Vec<bool>,
}

impl Alarms {
    pub fn new(n: usize) -> Alarms {
        Alarms {
            pending: vec![false; n],
            latched: vec![false; n],
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Clears every pending bit, preparing the next cycle.
    pub fn deactivate_all(&mut self) {
        self.pending.iter_mut().for_each(|b| *b = false);
    }

    /// Publishes the pending state into the latched state. Called once
    /// right after `deactivate_all`, before any stencil runs, and again
    /// after the stencils have finished writing.
    pub fn set(&mut self) {
        self.latched.copy_from_slice(&self.pending);
    }

    /// OR's bit `i` to true. Stencils may only call this, never clear a
    /// bit directly.
    pub fn activate(&mut self, i: usize) {
        if let Some(b) = self.pending.get_mut(i) {
            *b = true;
        }
    }

    /// Materialises the current pending state into the latched state —
    /// call once after all of a cycle's stencils have run, before reading
    /// `is_activated`.
    pub fn get(&mut self) {
        self.latched.copy_from_slice(&self.pending);
    }

    /// Reads the latched state of bit `i`. Only meaningful after `get()`.
    pub fn is_activated(&self, i: usize) -> bool {
        self.latched.get(i).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_alarms_are_inactive() {
        let alarms = Alarms::new(2);
        assert!(!alarms.is_activated(0));
        assert!(!alarms.is_activated(1));
    }

    #[test]
    fn activate_then_get_latches_true() {
        let mut alarms = Alarms::new(1);
        alarms.deactivate_all();
        alarms.set();
        alarms.activate(0);
        assert!(!alarms.is_activated(0)); // not materialised yet
        alarms.get();
        assert!(alarms.is_activated(0));
    }

    #[test]
    fn deactivate_all_clears_for_next_cycle() {
        let mut alarms = Alarms::new(1);
        alarms.deactivate_all();
        alarms.set();
        alarms.activate(0);
        alarms.get();
        assert!(alarms.is_activated(0));

        alarms.deactivate_all();
        alarms.set();
        alarms.get();
        assert!(!alarms.is_activated(0));
    }

    #[test]
    fn activate_is_or_only_within_a_cycle() {
        let mut alarms = Alarms::new(1);
        alarms.deactivate_all();
        alarms.set();
        alarms.activate(0);
        alarms.activate(0); // idempotent, no clearing API exists mid-cycle
        alarms.get();
        assert!(alarms.is_activated(0));
    }
}
