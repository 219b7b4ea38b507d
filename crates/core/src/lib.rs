//! Face enrollment from video, classifier training and open-set recognition.
//!
//! Each area follows the same layout: `domain` holds types, rules and the
//! ports (traits), `infrastructure` holds the adapters, and use cases in
//! `pipeline` wire them together behind [`pipeline::face_gallery_service`].

pub mod detection {
    pub mod domain {
        pub mod face_detector;
        pub mod face_embedder;
        pub mod face_locator;
        pub mod quality_gate;
    }
    pub mod infrastructure;
}

pub mod gallery {
    pub mod domain {
        pub mod embedding;
        pub mod embedding_store;
        pub mod identity_key;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod enroll_identity_use_case;
    pub mod face_gallery_service;
    pub mod infrastructure;
    pub mod recognize_face_use_case;
    pub mod training_scheduler;

    #[cfg(test)]
    pub(crate) mod test_support;
}

pub mod recognition {
    pub mod domain {
        pub mod decision;
        pub mod recognition_result;
        pub mod reference_gallery;
    }
    pub mod infrastructure;
}

pub mod shared {
    pub mod config;
    pub mod constants;
    pub mod error;
    pub mod frame;
    pub mod region;
    pub mod temp_file;
    pub mod video_metadata;
}

pub mod training {
    pub mod domain {
        pub mod bundle_repository;
        pub mod kernel_classifier;
        pub mod model_bundle;
        pub mod training_status;
    }
    pub mod infrastructure;
    pub mod training_coordinator;
}

pub mod video {
    pub mod domain {
        pub mod image_writer;
        pub mod video_reader;
    }
    pub mod infrastructure;
}
