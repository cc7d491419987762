//! Command handlers. Each takes the shared session built in `main`.

use anyhow::{bail, Context, Result};
use healthmon_core::api::Method;
use healthmon_core::auth::{AuthError, AuthSession, SessionStatus};
use healthmon_core::cache::{CacheManager, CachedData};
use healthmon_core::models::FitbitData;
use healthmon_core::utils::{format_date, truncate_string};
use serde_json::Value;
use tracing::warn;

/// Width of the provider column in `accounts`
const PROVIDER_WIDTH: usize = 20;

pub async fn login(session: &AuthSession, force: bool) -> Result<()> {
    if let Some(identity) = session.get_session() {
        if !force {
            println!("Already signed in as participant {}", identity.participant_id);
            return Ok(());
        }
    }

    match session.authenticate().await {
        Ok(identity) => {
            println!("Signed in as participant {}", identity.participant_id);
            Ok(())
        }
        Err(AuthError::Dismissed) => {
            println!("Sign-in cancelled.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(session: &AuthSession, cache: &CacheManager) -> Result<()> {
    session.sign_out().await?;
    if let Err(e) = cache.clear() {
        warn!(error = %e, "Failed to clear cache");
    }
    println!("Signed out.");
    Ok(())
}

pub async fn status(session: &AuthSession, cache: &CacheManager) -> Result<()> {
    let config = session.config();
    println!("Project:     {} ({:?})", config.project_id, config.environment);

    match session.status() {
        SessionStatus::Authenticated => {}
        other => {
            println!("Session:     {:?}", other);
            return Ok(());
        }
    }

    let identity = session.get_session().context("Session vanished")?;
    println!("Participant: {}", identity.participant_id);

    if let Some(credential) = session.credential() {
        match credential.minutes_until_expiry() {
            Some(minutes) if minutes <= 0 => println!("Token:       expired"),
            Some(minutes) => println!("Token:       expires in {} min", minutes),
            None => println!("Token:       no expiry reported"),
        }
        let refresh = if credential.refresh_token.is_some() { "yes" } else { "no" };
        println!("Refreshable: {}", refresh);
    }

    match session.participant().await {
        Ok(participant) => {
            if let Some(name) = participant.display_name() {
                println!("Name:        {}", name);
            }
        }
        Err(e) => warn!(error = %e, "Could not fetch participant profile"),
    }

    if let Ok(Some(cached)) = cache.load_fitbit() {
        println!("Fitbit data: cached {}", cached.age_display());
    }
    Ok(())
}

pub async fn connect(session: &AuthSession, provider: &str) -> Result<()> {
    let link = session.connect_external_account(provider).await?;
    if link.is_connected() {
        println!("{} connected.", link.provider);
    } else {
        println!(
            "{} is not connected yet (status: {}). Try `healthmon accounts` in a moment.",
            link.provider,
            link.status.as_str()
        );
    }
    Ok(())
}

pub async fn accounts(session: &AuthSession) -> Result<()> {
    let accounts = session.external_accounts().await?;
    if accounts.is_empty() {
        println!("No external accounts linked.");
        return Ok(());
    }

    for account in accounts {
        println!(
            "{:<width$} {}",
            truncate_string(&account.provider, PROVIDER_WIDTH),
            account.status.as_str(),
            width = PROVIDER_WIDTH
        );
    }
    Ok(())
}

pub async fn fitbit(
    session: &AuthSession,
    cache: &CacheManager,
    days: u32,
    offline: bool,
) -> Result<()> {
    if offline {
        let cached = cache
            .load_fitbit()?
            .context("No cached Fitbit data; run without --offline first")?;
        print_fitbit(&cached.data, Some(&cached));
        return Ok(());
    }

    match session.fitbit_data(days).await {
        Ok(data) => {
            if let Err(e) = cache.save_fitbit(&data) {
                warn!(error = %e, "Failed to cache Fitbit data");
            }
            print_fitbit(&data, None);
            Ok(())
        }
        Err(e) if !e.requires_reauthentication() => match cache.load_fitbit() {
            Ok(Some(cached)) => {
                warn!(error = %e, "Fetch failed; showing cached data");
                print_fitbit(&cached.data, Some(&cached));
                Ok(())
            }
            _ => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    }
}

fn print_fitbit(data: &FitbitData, cached: Option<&CachedData<FitbitData>>) {
    if let Some(cached) = cached {
        let stale = if cached.is_stale() { " (stale)" } else { "" };
        println!("Cached {}{}", cached.age_display(), stale);
    }

    if data.is_empty() {
        println!("No Fitbit data for this period.");
        return;
    }

    for day in &data.daily {
        let sleep = day
            .sleep_minutes
            .map(|m| format!("{}h{:02}m sleep", m / 60, m % 60))
            .unwrap_or_default();
        println!(
            "{:<14} {:>6} steps {:>5.1} km {:>4} active min  {}",
            format_date(&day.date),
            day.steps,
            day.distance_km,
            day.active_minutes,
            sleep
        );
    }

    println!("Total steps: {}", data.total_steps());
    if let Some(avg) = data.average_heart_rate() {
        println!(
            "Average heart rate: {:.0} bpm over {} samples",
            avg,
            data.heart_rate.len()
        );
    }
}

pub async fn call(
    session: &AuthSession,
    endpoint: &str,
    method: &str,
    data: Option<&str>,
) -> Result<()> {
    let method = parse_method(method)?;
    let body: Option<Value> = data
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--data must be valid JSON")?;

    let response = session.call_api(endpoint, method, body.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_method(raw: &str) -> Result<Method> {
    let upper = raw.to_ascii_uppercase();
    match upper.as_str() {
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" => {
            Method::from_bytes(upper.as_bytes()).context("Invalid HTTP method")
        }
        _ => bail!("Unsupported HTTP method '{}'", raw),
    }
}
