use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api::{AdminAction, ApiClient, ApiError};
use crate::config::Settings;
use crate::render::{render_customers, render_types};
use crate::storage::{clear_session, save_session};

pub(crate) async fn run_login(
    settings: &Settings,
    api: &mut ApiClient,
    account: &str,
    passwd: &str,
) -> Result<()> {
    let session = api.login(account, passwd).await?;
    save_session(settings.session_path.clone(), &session)
        .await
        .context("could not store session")?;
    println!("Logged in as {}.", account);
    Ok(())
}

pub(crate) async fn run_logout(settings: &Settings, api: &mut ApiClient) -> Result<()> {
    let remote = api.logout().await;
    let had_session = clear_session(settings.session_path.clone()).await?;
    remote.context("could not end the session on the backend")?;
    if had_session {
        println!("Logged out.");
    } else {
        info!("no local session was stored");
    }
    Ok(())
}

/// Removes the stored session once the backend has rejected it.
///
/// Returns whether a session file was removed. Failing to remove it is only
/// logged so the caller can still report `error` itself.
pub(crate) async fn forget_expired_session(settings: &Settings, error: &anyhow::Error) -> bool {
    if !matches!(error.downcast_ref::<ApiError>(), Some(ApiError::SessionExpired)) {
        return false;
    }

    warn!("session expired, removing stored session");
    match clear_session(settings.session_path.clone()).await {
        Ok(removed) => removed,
        Err(e) => {
            warn!(error = %e, "could not remove stored session");
            false
        }
    }
}

pub(crate) async fn run_customers(api: &ApiClient) -> Result<()> {
    let customers = api
        .get_customers()
        .await
        .context("could not fetch the list of customers")?;
    render_customers(&customers);
    Ok(())
}

pub(crate) async fn run_types(api: &ApiClient) -> Result<()> {
    let types = api
        .get_types()
        .await
        .context("could not fetch the list of terminal types")?;
    render_types(&types);
    Ok(())
}

fn confirmation(action: &AdminAction) -> String {
    match action {
        AdminAction::Beep(system) => format!("System #{} should have beeped.", system),
        AdminAction::Reboot(system) => format!("System #{} is probably rebooting.", system),
        AdminAction::Application {
            system,
            disable: false,
        } => format!("Digital signage application enabled on system #{}.", system),
        AdminAction::Application {
            system,
            disable: true,
        } => format!("Digital signage application disabled on system #{}.", system),
        AdminAction::Sync(system) => format!("System #{} has been synchronized.", system),
        AdminAction::Deploy(request) => format!(
            "System #{} marked as deployed at {}.",
            request.system,
            request.address.one_line()
        ),
    }
}

pub(crate) async fn run_action(api: &ApiClient, action: AdminAction) -> Result<()> {
    match api.administer(&action).await {
        Ok(()) => {
            println!("{}", confirmation(&action));
            Ok(())
        }
        Err(ApiError::Busy) => anyhow::bail!(
            "system #{} is busy with administrative tasks, try again later",
            action.system()
        ),
        Err(e) => Err(e).with_context(|| format!("action on system #{} failed", action.system())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DeployRequest;
    use crate::models::Address;

    fn settings_in(dir: &tempfile::TempDir, name: &str) -> Settings {
        Settings {
            session_path: dir.path().join(name).to_string_lossy().into_owned(),
            ..Settings::default()
        }
    }

    fn expired() -> anyhow::Error {
        anyhow::Error::new(ApiError::SessionExpired).context("could not fetch the list of systems")
    }

    #[tokio::test]
    async fn expired_session_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(&dir, "session.json");
        std::fs::write(&settings.session_path, "{}").unwrap();

        assert!(forget_expired_session(&settings, &expired()).await);
        assert!(!std::path::Path::new(&settings.session_path).exists());
    }

    #[tokio::test]
    async fn other_errors_keep_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(&dir, "session.json");
        std::fs::write(&settings.session_path, "{}").unwrap();

        let error = anyhow::Error::new(ApiError::Busy);
        assert!(!forget_expired_session(&settings, &error).await);
        assert!(std::path::Path::new(&settings.session_path).exists());
    }

    #[tokio::test]
    async fn failed_removal_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in place of the session file cannot be removed with remove_file.
        let settings = settings_in(&dir, "session.json");
        std::fs::create_dir(&settings.session_path).unwrap();

        assert!(!forget_expired_session(&settings, &expired()).await);
    }

    #[test]
    fn confirmations_name_the_system() {
        assert_eq!(confirmation(&AdminAction::Beep(4)), "System #4 should have beeped.");
        assert!(
            confirmation(&AdminAction::Application {
                system: 4,
                disable: true
            })
            .contains("disabled")
        );

        let deploy = AdminAction::Deploy(DeployRequest {
            system: 8,
            customer: 1,
            address: Address {
                street: "Am Anger".to_string(),
                house_number: "3".to_string(),
                zip_code: "10115".to_string(),
                city: "Berlin".to_string(),
            },
            connection: "DSL".to_string(),
            kind: "DDB".to_string(),
            weather: None,
            annotation: None,
        });
        assert_eq!(
            confirmation(&deploy),
            "System #8 marked as deployed at Am Anger 3, 10115 Berlin."
        );
    }
}
