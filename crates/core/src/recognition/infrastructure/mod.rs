pub mod directory_reference_gallery;
