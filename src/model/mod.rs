pub mod item;

pub use item::{Settings, Task, TaskDraft, parse_date, parse_time};
