mod connector;
mod mock;

pub use connector::{AccountHandle, BankConnector, ConnectorError};
pub use mock::MockBankConnector;
