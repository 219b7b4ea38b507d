pub mod json_bundle_repository;
