pub mod attempt;
pub mod exam;
pub mod notification;
pub mod score;
pub mod user;

pub use attempt::{AssessmentAttempt, AttemptStatus, AttemptSync, SubmittedAnswer, SyncStatus};
pub use exam::{Exam, Question};
pub use notification::{Notification, NotificationCategory, NotificationRequest};
pub use score::{CohortKey, ScoreKey, ScoreRecord, ScoreSource};
pub use user::{Actor, UserRole};
