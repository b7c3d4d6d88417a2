// Shared application state.
// Holds the trending listing most recently served to the application.

pub mod trending;

pub use trending::TrendingState;
