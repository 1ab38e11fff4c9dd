use tracing_subscriber::EnvFilter;

#[doc(hidden)]
pub fn __init_test(module_path: &'static str) {
    let crate_name = module_path.split("::").next().unwrap_or(module_path);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("{crate_name}=trace")))
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner, and only captures logs from the
/// calling crate.
///
/// # Example
///
/// ```ignore
/// harvest_log::init_test!();
/// ```
#[macro_export]
macro_rules! init_test {
    () => {
        $crate::__init_test(::std::module_path!());
    };
}
