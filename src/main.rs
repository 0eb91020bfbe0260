use std::process;

fn main() {
    process::exit(scone::cli::run());
}
