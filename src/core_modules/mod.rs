// The analysis core: frame model, change-point segmentation, region selection
// and alert evaluation. Everything in here is synchronous and free of I/O.

pub mod alert;
pub mod frame;
pub mod region_selector;
pub mod segmenter;
