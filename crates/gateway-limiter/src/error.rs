use thiserror::Error;

#[derive(Error, Debug)]
pub enum LimiterError {
	#[error("state store error: {0}")]
	Store(#[from] gateway_state::StoreError),
}
