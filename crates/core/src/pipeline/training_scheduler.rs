/// Fire-and-forget trigger for a background training run.
pub trait TrainingScheduler: Send + Sync {
    /// Requests a training run. Returns `false` when the request could not
    /// be dispatched at all.
    fn schedule(&self) -> bool;

    /// Blocks until every run scheduled so far has finished.
    fn wait_idle(&self) {}
}
