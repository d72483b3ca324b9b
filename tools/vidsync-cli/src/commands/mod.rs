pub mod align;
pub mod check;
pub mod locate;
pub mod report;
pub mod sync;
