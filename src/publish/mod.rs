mod list;
mod orchestrator;

pub use list::{DirectPublish, PublishList, PublishListBuilder};
pub use orchestrator::{PublishResult, Publisher};
