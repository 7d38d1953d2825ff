pub mod error;
pub mod token;
pub mod validator;

pub use error::AntibotRejection;
pub use token::{IssuedToken, TokenStore};
pub use validator::{AntibotValidator, WriteRequest};
