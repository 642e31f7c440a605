//! `Embedder` implementations: a local fastembed-backed provider and a
//! remote HTTP API client.

pub mod local_embedder;
pub mod remote_embedder;

pub use local_embedder::LocalEmbedder;
pub use remote_embedder::RemoteEmbedder;
