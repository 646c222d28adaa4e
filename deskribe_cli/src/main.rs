extern crate deskribe;
#[macro_use]
extern crate log;

use std::process;

fn main() {
    let args = deskribe::build_cli().get_matches();
    let name = args.subcommand_name().unwrap();
    let _ = deskribe::run(&args).map_err(|e| {
        error!("{} error: {}", name, e);
        deskribe::print_error_debug(&e);
        process::exit(1);
    });
    process::exit(0);
}
