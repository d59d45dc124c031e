use std::process;

fn main() {
    match tomo_batch_cli::run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("tomo-batch error: {err:#}");
            process::exit(tomo_batch_ops::ExitCode::Io.code());
        }
    }
}
