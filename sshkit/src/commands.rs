use sshkit::config::ConnectionConfig;
use sshkit::ssh::{RemoteSession, SessionOptions, SshResult};

use crate::cli::Commands;
use crate::output;

pub async fn run(
    config: ConnectionConfig,
    options: SessionOptions,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = RemoteSession::new(config).with_options(options);

    output::muted_stderr(&format!("Connecting to {}", session.config()));
    session.open().await?;

    let result = run_in_session(&mut session, command).await;
    session.close().await;
    Ok(result?)
}

async fn run_in_session(session: &mut RemoteSession, command: Commands) -> SshResult<()> {
    match command {
        Commands::Exec { command, check } => {
            let command = command.join(" ");
            if check {
                let output = session.exec_checked(&command).await?;
                eprint!("{}", output.stderr);
                print!("{}", output.stdout);
            } else {
                let stdout = session.exec(&command).await?;
                if !stdout.is_empty() {
                    println!("{stdout}");
                }
            }
        }
        Commands::Upload { local, remote } => {
            session.send(&local, &remote).await?;
            output::success(&format!("Uploaded {} to {}", local.display(), remote));
        }
        Commands::Download { remote, local } => {
            session.get(&remote, &local).await?;
            output::success(&format!("Downloaded {} to {}", remote, local.display()));
        }
    }
    Ok(())
}
