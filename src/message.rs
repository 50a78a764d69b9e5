/// All possible actions/events in the application following The Elm Architecture (TEA)
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // ===== Application Control =====
    Quit,
    NoOp,

    // ===== Queue Navigation =====
    QueueNavigateUp,
    QueueNavigateDown,
    QueueNavigateHome,
    QueueNavigateEnd,

    // ===== Queue Management =====
    RetrySelected,
    RetryAllFailed,
    RemoveSelected,
    ClearCompleted,
    ClearAll,

    // ===== Background Results =====
    /// One of the engines published a change.
    QueueChanged,
    RefreshListing,

    // ===== Error Messages =====
    ShowError { message: String },
    Clear,
}
