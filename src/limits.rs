/// Special requests are free text shown to the host; longer input is rejected.
pub const MAX_SPECIAL_REQUESTS_LEN: usize = 500;

/// Active (pending + confirmed) stays a single listing may hold.
pub const MAX_ACTIVE_STAYS_PER_LISTING: usize = 10_000;

/// Capacity of the journal writer's command channel.
pub const JOURNAL_CHANNEL_CAPACITY: usize = 4096;
