//! docflow service binary.
//!
//! This is the minimal entrypoint for the docflow CLI.
//! All logic is in the library; main.rs only invokes cli::run().

fn main() {
    if let Err(err) = docflow::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
