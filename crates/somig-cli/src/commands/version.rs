//! Version command implementation.

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() {
    println!("somig {VERSION}");
    println!();
    println!("Resumable saved-objects migrations for search-engine indices.");
    println!();
    println!("Build info:");
    println!("  Target: {}", std::env::consts::ARCH);
    println!("  OS:     {}", std::env::consts::OS);
}
