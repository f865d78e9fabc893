// kiln CLI entry point

use kiln_cli::logging::VerbosityLevel;
use kiln_cli::router::CommandRouter;

fn main() {
    let code = match CommandRouter::route() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("kiln: {}", e.user_message());
            if VerbosityLevel::Verbose.should_output() {
                eprintln!("{}", e.technical_details());
            }
            1
        }
    };
    std::process::exit(code);
}
