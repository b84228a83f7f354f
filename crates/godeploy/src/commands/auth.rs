use std::io;

use common::{config::Settings, paths::Paths};
use derive_more::{Display, Error, From};
use dialoguer::{Input, Password};

use crate::{
    api::{ApiClient, ApiError, HttpApiClient, Session},
    commands::{credential_store, Auth, AuthCommands, Credentials},
    credentials::{CredentialError, CredentialStore},
    process::login_hint,
    reporter::{Reporter, SpinnerReporter},
    token::TokenManager,
};

/// Minimal accepted password length on sign-up.
const MIN_PASSWORD_LENGTH: usize = 8;

/// `auth` subcommand errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum AuthError {
    /// Credential storage error.
    Credentials(CredentialError),

    /// Deployment service error.
    Api(ApiError),

    /// Prompt error.
    Io(io::Error),

    /// Sign-up password below [`MIN_PASSWORD_LENGTH`].
    #[display(fmt = "password must be at least {} characters long", MIN_PASSWORD_LENGTH)]
    PasswordTooShort,
}

/// Authentication flow entrypoint.
pub(crate) fn auth(Auth { command }: Auth, paths: &Paths, settings: &Settings) -> Result<(), AuthError> {
    let api = HttpApiClient::new(
        &settings.api_url,
        settings.request_timeout(),
        settings.upload_timeout(),
    )?;
    let tokens = TokenManager::new(credential_store(paths), |token| api.refresh_token(token));

    match command {
        AuthCommands::Login(credentials) => login(credentials, &tokens, &api),
        AuthCommands::Signup(credentials) => signup(credentials, &tokens, &api),
        AuthCommands::Status => {
            status(&tokens);
            Ok(())
        }
        AuthCommands::Logout => {
            tokens.store().clear_auth_token()?;
            println!("Logged out. Your email is kept for the next login.");
            Ok(())
        }
    }
}

/// Sign in and save the session, unless a valid one already exists.
fn login(
    Credentials { email, password }: Credentials,
    tokens: &TokenManager,
    api: &HttpApiClient,
) -> Result<(), AuthError> {
    if let Some(saved_email) = active_session(tokens)? {
        println!("Already authenticated as {saved_email}");
        return Ok(());
    }

    let store = tokens.store();

    let email = match email {
        Some(email) => email,
        None => prompt_email(store.user_email()?)?,
    };

    let password = match password {
        Some(password) => password,
        None => Password::new().with_prompt("Password").interact()?,
    };

    let reporter = SpinnerReporter::new();
    reporter.step("Signing in...");

    let session = api.sign_in(&email, &password)?;
    save_session(store, &session)?;

    reporter.finish(&format!("Signed in as {}.", session.email));

    Ok(())
}

/// Create an account and save the session, unless a valid one already exists.
fn signup(
    Credentials { email, password }: Credentials,
    tokens: &TokenManager,
    api: &HttpApiClient,
) -> Result<(), AuthError> {
    if let Some(saved_email) = active_session(tokens)? {
        println!("Already authenticated as {saved_email}");
        println!("Run 'godeploy auth logout' first to create another account.");
        return Ok(());
    }

    let store = tokens.store();

    let email = match email {
        Some(email) => email,
        None => prompt_email(String::new())?,
    };

    let password = match password {
        Some(password) => password,
        None => Password::new()
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()?,
    };

    validate_password(&password)?;

    let reporter = SpinnerReporter::new();
    reporter.step("Creating account...");

    let session = api.sign_up(&email, &password)?;
    save_session(store, &session)?;

    reporter.finish(&format!("Account created, signed in as {}.", session.email));

    Ok(())
}

/// Saved email when the stored session is usable, refreshing it if needed.
fn active_session(tokens: &TokenManager) -> Result<Option<String>, CredentialError> {
    let store = tokens.store();

    if store.is_authenticated()? && tokens.ensure_valid_token().is_ok() {
        return Ok(Some(store.user_email()?));
    }

    Ok(None)
}

/// Print whether a usable session exists.
fn status(tokens: &TokenManager) {
    let email = tokens.store().user_email().unwrap_or_default();

    match tokens.ensure_valid_token() {
        Ok(_) if email.is_empty() => println!("Authenticated."),
        Ok(_) => println!("Authenticated as {email}."),
        Err(error) => {
            println!("Not authenticated: {error}");
            println!("{}", login_hint(&email));
        }
    }

    println!("Credentials file: {}", tokens.store().path().display());
}

/// Ask for an email, offering the saved one as the default.
fn prompt_email(saved: String) -> io::Result<String> {
    let mut input = Input::<String>::new();
    input.with_prompt("Email");

    if !saved.is_empty() {
        input.default(saved);
    }

    input.interact_text()
}

/// Enforce [`MIN_PASSWORD_LENGTH`].
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::PasswordTooShort);
    }

    Ok(())
}

/// Persist the session tokens and email.
fn save_session(store: &CredentialStore, session: &Session) -> Result<(), CredentialError> {
    store.set_tokens(&session.tokens.access_token, &session.tokens.refresh_token)?;
    store.set_user_email(&session.email)?;

    tracing::info!(email = %session.email, "session saved");

    Ok(())
}
