mod config;
mod launch;
mod trace;

#[macro_use]
extern crate tracing;

use crate::launch::RootCommand;

fn main() {
    let opts: RootCommand = argh::from_env();

    if let Err(code) = opts.run() {
        std::process::exit(code);
    }
}
