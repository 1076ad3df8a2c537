mod local_kms;

pub use local_kms::LocalKms;
