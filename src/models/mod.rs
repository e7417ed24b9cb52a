mod currency;
mod id;
mod owner;
mod transaction;
mod wallet;

pub use currency::CurrencyCode;
pub use id::{FixedIdGenerator, Id, IdGenerator, UuidIdGenerator};
pub use owner::OwnerId;
pub use transaction::{NewTransaction, PriceStatus, Transaction, TransactionKind};
pub use wallet::Wallet;
