pub mod analytics;
pub mod catalog;
pub mod job;
pub mod viewing;

pub use analytics::{
    AnalyticsPayload, MonthlyWatchtime, RatingWatchtime, TitleWatchtime, TypeShare, WatchSummary, YearlyTrends, YearlyWatchtime,
    MONTH_LABELS,
};
pub use catalog::{CatalogEntry, MEDIA_TYPE_MOVIE, MEDIA_TYPE_TV_SHOW, UNKNOWN};
pub use job::{JobId, JobStatus, ProfileYears, ResultKey, StoredResult, UserId, WorkUnit};
pub use viewing::{EnrichedRecord, NormalizedRecord, RawRecord};
