use ipcamera_lib::{
    launcher::{launch, LaunchError},
    server::RelayServer,
};
use log::{debug, error};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut stdout = std::io::stdout().lock();

    let code = match launch(std::env::args_os().skip(1), &RelayServer::new(), &mut stdout) {
        Ok(outcome) => outcome.exit_code(),
        Err(err @ LaunchError::Usage(_)) => {
            debug!("{}", err);
            err.exit_code()
        }
        Err(err) => {
            error!("{}", err);
            err.exit_code()
        }
    };

    std::process::exit(code);
}
