pub mod dispatch;
pub mod master;

pub use dispatch::{Dispatcher, INDEX_HTML, INDEX_PATHS, Route};
pub use master::Master;
