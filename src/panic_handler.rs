use std::io::{self, Write};
use std::panic;

/// Install `better_panic` backtraces, flushing stdout and logging the panic
/// before the default hook runs.
pub fn initialize_panic_handler() {
    better_panic::Settings::auto()
        .most_recent_first(false)
        .lineno_suffix(true)
        .install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = io::stdout().flush();
        log::error!("panic: {panic_info}");

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
