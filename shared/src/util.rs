use std::fmt::Write;

pub fn report(mut err: &dyn (std::error::Error)) -> String {
    let mut s = format!("{err}");
    while let Some(src) = err.source() {
        let _ = write!(s, "\n\nCaused by: {src}");
        err = src;
    }
    s
}
