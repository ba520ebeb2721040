use bitflags::bitflags;

/// Counts iterations of a worker's event loop.
///
/// A worker ticks once per job it ran and once per failed search for work.
/// The count itself means nothing; the [`TickerData`] a scheduler flavor
/// hands to [`tick`](Self::tick) decides which ticks trigger housekeeping.
/// It wraps around silently, so policies should only rely on it modulo some
/// interval.
#[derive(Debug)]
pub(crate) struct Ticker {
    tick: u32,
}

impl Ticker {
    pub(crate) fn new() -> Self {
        Self { tick: 0 }
    }

    /// Advances the count and asks `data` what the loop should do next.
    pub(crate) fn tick<T: TickerData>(&mut self, ctx: &T::Context, data: &mut T) -> TickerEvents {
        self.tick = self.tick.wrapping_add(1);
        data.update_and_check(ctx, self.tick)
    }
}

/// Implemented by each scheduler flavor to turn ticks into events. Keeps the
/// event loop policy apart from the loop itself.
pub(crate) trait TickerData {
    /// State shared by every worker of the scheduler, such as its shutdown
    /// flag.
    type Context;

    // Several events may fire on the same tick. The loop handles `SHUTDOWN`
    // first and ignores everything else once it is set.
    fn update_and_check(&mut self, ctx: &Self::Context, tick: u32) -> TickerEvents;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub(crate) struct TickerEvents: u16 {
        /// Look at the global queue before the local one on the next search.
        const POP_GLOBAL_QUEUE = 1;

        /// A request to shut down the runtime.
        const SHUTDOWN = 1 << 1;
    }
}
