// Export modules for use in tests
pub mod app;
pub mod book;
pub mod error;
pub mod event_source;
pub mod flow;
pub mod hud;
pub mod measure;
pub mod metrics;
pub mod page_view;
pub mod pagination;
pub mod panic_handler;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod state;
pub mod storage;
pub mod style;
pub mod transition;
pub mod voice;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use app::{App, AppAction, run_app_with_event_source};
pub use book::{BookData, PointRef};
pub use error::ReaderError;
pub use pagination::{Pagination, PaginationKey, build_pagination};
pub use session::{ChapterDirection, FallbackPage, ReaderSession, RenderOutcome};
