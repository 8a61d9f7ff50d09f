//! Anomaly models: unsupervised isolation forest, supervised random forest, score scaling.

mod isolation;
mod labels;
mod random_forest;
mod scaler;

pub use isolation::{average_path_length, quantile, IsolationForest};
pub use labels::load_labels;
pub use random_forest::RandomForest;
pub use scaler::StandardScaler;
