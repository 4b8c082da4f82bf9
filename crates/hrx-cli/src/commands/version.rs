//! Version command

pub fn run() {
    println!("hrx {}", env!("CARGO_PKG_VERSION"));
}
