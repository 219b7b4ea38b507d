pub mod json_embedding_store;
