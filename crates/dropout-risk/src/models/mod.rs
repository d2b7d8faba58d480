pub mod classifier_trait;
pub mod factory;
pub mod forest;
pub mod gbdt;
pub mod mlp;
pub mod tree;
pub mod voting;

pub use classifier_trait::ClassifierModel;
pub use factory::TrainedModel;
