pub mod cancel;
pub mod fs_atomic;
pub mod ids;
pub mod logging;
pub mod serde_ext;

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
