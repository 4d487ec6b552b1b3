//! Binary entrypoint for fontfill-cli (made by FontLab https://www.fontlab.com/)

fn main() {
    if let Err(err) = fontfill_cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
