// Account flows: signup, login, logout and listing sites.
// Each flow is a short sequence of prompts; a cancelled prompt ends the
// command cleanly, invalid input re-prompts.

use crate::api::RequestOptions;
use crate::context::Context;
use crate::credentials::{now_millis, ApiKey, UserCredentials, SESSION_TTL_MS};
use crate::error::{PinpointError, Result};
use crate::ui::{self, Prompter};
use regex::Regex;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Returned by `/user/signup` for both new and existing accounts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignupResponse {
    user_id: String,
    login_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    #[serde(default)]
    site_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Site {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct SitesResponse {
    #[serde(default)]
    sites: Vec<Site>,
}

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^<>()\[\]\\.,;:\s@\x22]+(\.[^<>()\[\]\\.,;:\s@\x22]+)*@([a-zA-Z0-9-]+\.)+[a-zA-Z]{2,}$").ok()
    })
    .as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(email))
}

fn validate_email(value: &str) -> Option<String> {
    (!is_valid_email(value)).then(|| "Please enter a valid email address".to_string())
}

fn validate_required(value: &str) -> Option<String> {
    value.trim().is_empty().then(|| "This field is required".to_string())
}

fn validate_slug(value: &str) -> Option<String> {
    let len = value.chars().count();
    (len == 0 || len >= 40).then(|| "The slug must be between 1 and 39 characters".to_string())
}

/// Lowercase, ASCII-only, dash-separated slug for a site name.
pub fn slugify(value: &str) -> String {
    let mut slug = String::new();
    for c in value.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

fn ask_email(prompter: &dyn Prompter) -> Result<String> {
    prompter
        .text("What is your email address?", None, &validate_email)?
        .or_cancel()
}

/// `pinpoint login`
pub fn login(ctx: &Context, prompter: &dyn Prompter) -> Result<()> {
    let email = ask_email(prompter)?;
    let body = json!({
        "user": { "email": email },
        "site": { "slug": "" },
        "offline": true,
    });
    let res = match ctx.request("Verifying your account", "/user/signup", RequestOptions::json(body).non_fatal()) {
        Ok(res) => res,
        Err(PinpointError::Api(message)) if message.contains("no user found") => {
            return Err(PinpointError::Fatal(
                "No user found using this email address. Perhaps you entered it incorrectly?".to_string(),
            ));
        }
        Err(e) => return Err(e),
    };
    let signup: SignupResponse = serde_json::from_value(res)?;
    verify(ctx, prompter, &email, &signup)
}

/// Ask for the emailed code until the server accepts it, then offer to save
/// the session.
fn verify(ctx: &Context, prompter: &dyn Prompter, email: &str, signup: &SignupResponse) -> Result<()> {
    println!();
    ui::notice(&format!("We sent you an email at {email} to verify your account."));
    println!();

    let verified = loop {
        let code = prompter
            .text("Please enter the code from the email:", None, &validate_required)?
            .or_cancel()?;
        let opts = RequestOptions::json(json!({ "email": email, "code": code }))
            .method(Method::PUT)
            .api_key(signup.login_token.clone())
            .non_fatal();
        match ctx.request("Verifying the code", "/user/signup/code", opts) {
            Ok(res) => break serde_json::from_value::<VerifyResponse>(res).unwrap_or_default(),
            Err(PinpointError::Api(_)) => {
                ui::error("Invalid code supplied. Please try again");
            }
            Err(e) => return Err(e),
        }
    };

    let save = prompter
        .confirm("Save login information on this machine for 30 days?", true)?
        .or_cancel()?;
    if save {
        ctx.credentials.save_api_key(
            ctx.apihost(),
            &signup.user_id,
            Some(UserCredentials {
                email: email.to_string(),
                site_ids: verified.site_ids,
                apikey: ApiKey {
                    value: signup.login_token.clone(),
                    expires: now_millis() + SESSION_TTL_MS,
                },
            }),
        )?;
        ui::tick(&format!(
            "We saved your cached credentials at {}",
            ctx.credentials.path().display()
        ));
        println!();
    }
    Ok(())
}

struct SignupDetails {
    email: String,
    first_name: String,
    last_name: String,
    site_name: String,
    slug: String,
}

/// `pinpoint signup`
pub fn signup(ctx: &Context, prompter: &dyn Prompter) -> Result<()> {
    println!();
    println!("There are 3 quick steps to setup your first Pinpoint site:");
    println!();
    println!(" 1. Your name and email");
    println!(" 2. Your site name");
    println!(" 3. Your site url");
    println!();

    let details = loop {
        let details = collect_details(ctx, prompter)?;
        println!();
        println!("OK, please confirm the following is correct:");
        println!();
        println!(" Your Name:   {} {}", details.first_name, details.last_name);
        println!(" Your Email:  {}", details.email);
        println!(" Your Site:   {}", details.site_name);
        println!(" Your URL:    https://{}.pinpoint.com", details.slug);
        println!();
        if prompter.confirm("Does this look correct?", true)?.or_cancel()? {
            break details;
        }
    };

    println!();
    ui::notice(
        "OK, this is it (promise)! Please review our Privacy Policy (https://pinpoint.com/privacy) \
         and Terms of Service (https://pinpoint.com/terms)",
    );
    println!();
    if !prompter.confirm("Please confirm you agree?", true)?.or_cancel()? {
        return Err(PinpointError::Declined);
    }

    let body = json!({
        "user": {
            "email": details.email,
            "firstName": details.first_name,
            "lastName": details.last_name,
        },
        "site": { "name": details.site_name, "slug": details.slug },
        "offline": true,
    });
    let res = ctx.request("Creating your account", "/user/signup", RequestOptions::json(body))?;
    let signup: SignupResponse = serde_json::from_value(res)?;
    verify(ctx, prompter, &details.email, &signup)?;
    println!();
    ui::tick("Your account is activated!");
    Ok(())
}

fn collect_details(ctx: &Context, prompter: &dyn Prompter) -> Result<SignupDetails> {
    let email = ask_email(prompter)?;
    let first_name = prompter
        .text("What's your first name (given name)?", None, &validate_required)?
        .or_cancel()?;
    let last_name = prompter
        .text("What's your last name (family name)?", None, &validate_required)?
        .or_cancel()?;
    ui::notice("\nOK, you need to set your site name which usually is your company name or product name\n");
    let site_name = prompter
        .text("What's your site's name?", None, &validate_required)?
        .or_cancel()?;
    ui::notice("\nOK, now you need to choose your site slug which is the short part of your url\n");

    let mut initial = slugify(&site_name);
    let slug = loop {
        let slug = prompter
            .text("What's your site's slug?", Some(&initial), &validate_slug)?
            .or_cancel()?;
        if slug_available(ctx, &slug)? {
            break slug;
        }
        initial.clear();
    };

    Ok(SignupDetails {
        email,
        first_name,
        last_name,
        site_name,
        slug,
    })
}

fn slug_available(ctx: &Context, slug: &str) -> Result<bool> {
    let check = |body: &Value| {
        if body.get("exists").and_then(Value::as_bool).unwrap_or(false) {
            (false, "Oops! Already taken, please try another one...".to_string())
        } else {
            (
                true,
                format!("Perfect! Your site will be https://{slug}.pinpoint.com but you can change it or use your own domain"),
            )
        }
    };
    let opts = RequestOptions::default().non_fatal().check(&check);
    match ctx.request("Checking availability...", &format!("/user/site/{slug}"), opts) {
        Ok(_) => Ok(true),
        Err(PinpointError::Api(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// `pinpoint logout`: forget every saved session, or with `only_user` just
/// one account on the current host.
pub fn logout(ctx: &Context, prompter: &dyn Prompter, only_user: bool) -> Result<()> {
    if only_user {
        let user_id = ctx.select_user(prompter)?;
        ctx.credentials.remove_user(ctx.apihost(), &user_id)?;
    } else {
        ctx.credentials.save_api_key("", "", None)?;
    }
    println!("Logged out! 👋");
    Ok(())
}

/// `pinpoint sites`: the sites the selected account can deploy to.
pub fn sites(ctx: &Context, prompter: &dyn Prompter) -> Result<Vec<Site>> {
    let user_id = ctx.select_user(prompter)?;
    let api_key = ctx
        .credentials
        .get_api_key(ctx.apihost(), "", Some(&user_id))?
        .ok_or(PinpointError::NotLoggedIn)?;
    let res = ctx.request(
        "Fetching your sites",
        "/user/sites",
        RequestOptions::default().api_key(api_key).required(),
    )?;
    let SitesResponse { sites } = serde_json::from_value(res)?;
    if sites.is_empty() {
        return Err(PinpointError::Fatal("No sites found. Please create a site first.".to_string()));
    }
    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("jane.doe+x@mail.example.co"));
        assert!(!is_valid_email("jane@"));
        assert!(!is_valid_email("not an email"));
        assert!(!is_valid_email("a@b"));
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Acme Rockets, Inc."), "acme-rockets-inc");
        assert_eq!(slugify("  --Hello   World--  "), "hello-world");
        assert_eq!(slugify("Café"), "caf");
        assert!(validate_slug("").is_some());
        assert!(validate_slug(&"x".repeat(40)).is_some());
        assert!(validate_slug("demo").is_none());
    }
}
