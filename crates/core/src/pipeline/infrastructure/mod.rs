pub mod thread_training_scheduler;
