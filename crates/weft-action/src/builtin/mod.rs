mod command;
mod data_source;
mod function;
mod identity;
mod sink;

pub use command::CommandAction;
pub use data_source::{DataSource, DataSourceAction, TemplateDataSource};
pub use function::FnAction;
pub use identity::Identity;
pub use sink::{CONTAINER_PORT, SinkAction};
