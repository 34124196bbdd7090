pub mod bridge;
pub mod dbgp;
pub mod ui;

/// Transforms `Result` into `Option` and logs the error if there is one.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "bridge", "{:#}", e);
                None
            }
        }
    };
    ($res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "bridge", concat!($msg, ": {:#}"), e);
                None
            }
        }
    };
}
