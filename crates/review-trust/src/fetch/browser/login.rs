//! Interactive sign-in state machine.
//!
//! `LocateLoginLink → SubmitIdentifier → SubmitPassword → Challenge → Verify → Done`
//!
//! Every element lookup tries an ordered list of selector alternatives and
//! polls until the step's budget runs out. Running out of alternatives or
//! budget ends the flow with [`FetchError::LoginFailed`].

use super::{dismiss_consent, BrowserPage};
use crate::error::FetchError;
use crate::normalize::mask_email;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

const LOGIN_LINKS: &[&str] = &[
    "a[data-nav-role='signin']",
    "#nav-link-accountList a",
    "a[href*='/ap/signin']",
];
const EMAIL_FIELDS: &[&str] = &[
    "#ap_email_login",
    "input#ap_email",
    "input[name='email']",
    "input[type='email']",
];
const CONTINUE_BUTTONS: &[&str] = &["#continue", "input#continue"];
const PASSWORD_FIELDS: &[&str] = &[
    "input#ap_password",
    "input[name='password']",
    "input[type='password']",
];
const SUBMIT_BUTTONS: &[&str] = &[
    "#signInSubmit",
    "form[action*='/ap/signin'] input[type='submit']",
];
const OTP_FIELDS: &[&str] = &[
    "#auth-mfa-otpcode",
    "input#cvf-input-code",
    "input[name='otpCode']",
    "input[name='code']",
];
const OTP_SUBMIT: &[&str] = &[
    "#auth-signin-button",
    "#cvf-submit-otp-button input",
    "input[type='submit']",
];
const CAPTCHA_MARKERS: &[&str] = &[
    "iframe[src*='captcha']",
    "img[src*='captcha']",
    "input[name='cvf_captcha_input']",
];
const ACCOUNT_GREETING: &str = "#nav-link-accountList-nav-line-1";
const SIGNED_OUT_WORDS: &[&str] = &["sign in", "ログイン", "サインイン"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    LocateLoginLink,
    SubmitIdentifier,
    SubmitPassword,
    Challenge,
    Verify,
    Done,
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    /// One-time code; when absent, a challenge must be resolved externally.
    pub otp: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &mask_email(&self.email))
            .field("password", &"***")
            .field("otp", &self.otp.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Per-step wait budgets.
#[derive(Debug, Clone)]
pub struct LoginTimeouts {
    pub login_link: Duration,
    pub fields: Duration,
    pub otp: Duration,
    pub captcha: Duration,
    pub navigation: Duration,
    pub verify_polls: u32,
    pub verify_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for LoginTimeouts {
    fn default() -> Self {
        Self {
            login_link: Duration::from_secs(60),
            fields: Duration::from_secs(90),
            otp: Duration::from_secs(120),
            captcha: Duration::from_secs(60),
            navigation: Duration::from_secs(60),
            verify_polls: 60,
            verify_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
        }
    }
}

fn browser_err(e: anyhow::Error) -> FetchError {
    FetchError::Browser(e.to_string())
}

/// Whether the account greeting shows a signed-in user.
pub async fn is_logged_in(page: &dyn BrowserPage) -> bool {
    match page.text_of(ACCOUNT_GREETING).await {
        Ok(Some(text)) => {
            let lower = text.to_lowercase();
            !lower.is_empty() && !SIGNED_OUT_WORDS.iter().any(|w| lower.contains(w))
        }
        _ => false,
    }
}

/// Drives one sign-in attempt on a page.
pub struct LoginFlow<'a> {
    page: &'a dyn BrowserPage,
    credentials: &'a Credentials,
    timeouts: &'a LoginTimeouts,
    step: LoginStep,
}

impl<'a> LoginFlow<'a> {
    pub fn new(page: &'a dyn BrowserPage, credentials: &'a Credentials, timeouts: &'a LoginTimeouts) -> Self {
        Self {
            page,
            credentials,
            timeouts,
            step: LoginStep::LocateLoginLink,
        }
    }

    pub fn step(&self) -> LoginStep {
        self.step
    }

    /// Run to `Done` or fail.
    pub async fn run(&mut self) -> Result<(), FetchError> {
        tracing::info!(account = %mask_email(&self.credentials.email), "starting interactive login");
        dismiss_consent(self.page).await;

        if is_logged_in(self.page).await {
            tracing::info!("session already signed in");
            self.step = LoginStep::Done;
            return Ok(());
        }

        while self.step != LoginStep::Done {
            tracing::debug!(step = ?self.step, "login step");
            self.step = match self.step {
                LoginStep::LocateLoginLink => self.locate_login_link().await?,
                LoginStep::SubmitIdentifier => self.submit_identifier().await?,
                LoginStep::SubmitPassword => self.submit_password().await?,
                LoginStep::Challenge => self.challenge().await?,
                LoginStep::Verify => self.verify().await?,
                LoginStep::Done => LoginStep::Done,
            };
        }
        tracing::info!(account = %mask_email(&self.credentials.email), "login complete");
        Ok(())
    }

    async fn locate_login_link(&self) -> Result<LoginStep, FetchError> {
        // Already on the sign-in form (e.g. redirected there).
        if self.first_present(EMAIL_FIELDS).await?.is_some() {
            return Ok(LoginStep::SubmitIdentifier);
        }
        if self.first_present(PASSWORD_FIELDS).await?.is_some() {
            return Ok(LoginStep::SubmitPassword);
        }
        let link = self
            .wait_for_any(LOGIN_LINKS, self.timeouts.login_link)
            .await?
            .ok_or_else(|| FetchError::LoginFailed("sign-in link not found".into()))?;
        self.page.click(link).await.map_err(browser_err)?;
        Ok(LoginStep::SubmitIdentifier)
    }

    async fn submit_identifier(&self) -> Result<LoginStep, FetchError> {
        let deadline = Instant::now() + self.timeouts.fields;
        loop {
            if let Some(field) = self.first_present(EMAIL_FIELDS).await? {
                self.page
                    .fill(field, &self.credentials.email)
                    .await
                    .map_err(browser_err)?;
                if let Some(button) = self.first_present(CONTINUE_BUTTONS).await? {
                    self.page.click(button).await.map_err(browser_err)?;
                }
                return Ok(LoginStep::SubmitPassword);
            }
            // Remembered accounts skip straight to the password.
            if self.first_present(PASSWORD_FIELDS).await?.is_some() {
                return Ok(LoginStep::SubmitPassword);
            }
            if Instant::now() >= deadline {
                return Err(FetchError::LoginFailed("email field not found".into()));
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }
    }

    async fn submit_password(&self) -> Result<LoginStep, FetchError> {
        let field = self
            .wait_for_any(PASSWORD_FIELDS, self.timeouts.fields)
            .await?
            .ok_or_else(|| FetchError::LoginFailed("password field not found".into()))?;
        self.page
            .fill(field, &self.credentials.password)
            .await
            .map_err(browser_err)?;
        let submit = self
            .wait_for_any(SUBMIT_BUTTONS, self.timeouts.navigation)
            .await?
            .ok_or_else(|| FetchError::LoginFailed("sign-in button not found".into()))?;
        self.page.click(submit).await.map_err(browser_err)?;
        Ok(LoginStep::Challenge)
    }

    /// After submit, wait for the next page to show a one-time code field,
    /// a captcha or the signed-in greeting, and resolve whichever comes up.
    async fn challenge(&self) -> Result<LoginStep, FetchError> {
        let deadline = Instant::now() + self.timeouts.navigation;
        loop {
            if let Some(field) = self.present_now(OTP_FIELDS).await {
                self.resolve_otp(field).await?;
                break;
            }
            if self.present_now(CAPTCHA_MARKERS).await.is_some() {
                break;
            }
            if is_logged_in(self.page).await {
                return Ok(LoginStep::Verify);
            }
            if Instant::now() >= deadline {
                tracing::debug!("no challenge appeared after submit");
                break;
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }

        // A captcha can also follow the one-time code.
        if self.present_now(CAPTCHA_MARKERS).await.is_some() {
            tracing::warn!("captcha during login; waiting for external resolution");
            if !self.wait_until_gone(CAPTCHA_MARKERS, self.timeouts.captcha).await? {
                return Err(FetchError::LoginFailed("captcha not resolved".into()));
            }
        }
        Ok(LoginStep::Verify)
    }

    async fn resolve_otp(&self, field: &'static str) -> Result<(), FetchError> {
        match self.credentials.otp.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(code) => {
                tracing::info!("submitting one-time code");
                self.page.fill(field, code.trim()).await.map_err(browser_err)?;
                if let Some(button) = self.first_present(OTP_SUBMIT).await? {
                    self.page.click(button).await.map_err(browser_err)?;
                }
            }
            None => tracing::warn!("one-time code required; waiting for external resolution"),
        }
        if !self.wait_until_gone(OTP_FIELDS, self.timeouts.otp).await? {
            return Err(FetchError::LoginFailed("one-time code challenge not resolved".into()));
        }
        Ok(())
    }

    async fn verify(&self) -> Result<LoginStep, FetchError> {
        for _ in 0..self.timeouts.verify_polls.max(1) {
            if is_logged_in(self.page).await {
                return Ok(LoginStep::Done);
            }
            tokio::time::sleep(self.timeouts.verify_interval).await;
        }
        Err(FetchError::LoginFailed("could not verify signed-in state".into()))
    }

    async fn first_present(&self, selectors: &'static [&'static str]) -> Result<Option<&'static str>, FetchError> {
        for css in selectors {
            if self.page.exists(css).await.map_err(browser_err)? {
                return Ok(Some(*css));
            }
        }
        Ok(None)
    }

    /// Like `first_present`, but a lookup error (page mid-navigation) counts as no match.
    async fn present_now(&self, selectors: &'static [&'static str]) -> Option<&'static str> {
        match self.first_present(selectors).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(error = %e, "selector lookup failed; page still loading");
                None
            }
        }
    }

    /// Poll until one of the selectors matches or the budget expires.
    async fn wait_for_any(
        &self,
        selectors: &'static [&'static str],
        budget: Duration,
    ) -> Result<Option<&'static str>, FetchError> {
        let deadline = Instant::now() + budget;
        loop {
            if let Some(css) = self.first_present(selectors).await? {
                return Ok(Some(css));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }
    }

    /// Poll until none of the selectors match. False when the budget expired first.
    async fn wait_until_gone(&self, selectors: &'static [&'static str], budget: Duration) -> Result<bool, FetchError> {
        let deadline = Instant::now() + budget;
        loop {
            if self.first_present(selectors).await?.is_none() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }
    }
}
