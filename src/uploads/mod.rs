//! 图片上传存储模块
//!
//! ## 目录结构
//! ```text
//! {upload.dir}/
//! ├── {uuid}_face.jpg
//! ├── {uuid}_tongue.png
//! └── ...
//! ```

pub mod storage;
pub mod types;

pub use storage::{content_type_for, sanitize_file_name, ImageStorage};
pub use types::*;
