//! Session driver: one browser page bound to one account
//!
//! Login and logout go through the host application's own authentication
//! screen. Form fields are addressed by label and buttons by role and name,
//! never by markup-specific identifiers.

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info};

use crate::account::Account;
use crate::browser::{BrowserLauncher, BrowserPage, FrameHandle, Locator, Role, Scope};
use crate::config::Settings;
use crate::error::{HarnessError, HarnessResult};
use crate::target::{wait_hidden, wait_visible, Target, TextMatch};
use crate::wait::Deadline;

pub struct Session {
    page: Box<dyn BrowserPage>,
    account: Arc<Account>,
    settings: Arc<Settings>,
    frame: Option<FrameHandle>,
    authenticated: bool,
    closed: bool,
}

impl Session {
    /// Launch an isolated browser context for `account`.
    pub async fn open(
        launcher: &dyn BrowserLauncher,
        account: Arc<Account>,
        settings: Arc<Settings>,
    ) -> HarnessResult<Self> {
        let page = launcher.launch().await?;
        Ok(Self::with_page(page, account, settings))
    }

    pub fn with_page(
        page: Box<dyn BrowserPage>,
        account: Arc<Account>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            page,
            account,
            settings,
            frame: None,
            authenticated: false,
            closed: false,
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn page(&mut self) -> &mut dyn BrowserPage {
        self.page.as_mut()
    }

    pub fn frame(&self) -> Option<&FrameHandle> {
        self.frame.as_ref()
    }

    pub(crate) fn set_frame(&mut self, frame: FrameHandle) {
        self.frame = Some(frame);
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Authentication entry point with the return-path parameter.
    pub fn login_url(&self) -> HarnessResult<String> {
        let host = &self.settings.host;
        let base = format!(
            "{}{}",
            self.settings.base_url.trim_end_matches('/'),
            host.login_path
        );
        let url = Url::parse_with_params(&base, &[(host.return_param.as_str(), host.return_path.as_str())])
            .map_err(|e| HarnessError::Config(format!("invalid login URL '{base}': {e}")))?;
        Ok(url.to_string())
    }

    fn login_button(&self) -> Target {
        Target::role(Role::Button, TextMatch::exact(&self.settings.host.login_button))
    }

    /// Name the host gives the signed-in user's menu button.
    pub fn user_menu_name(&self) -> String {
        self.settings.host.user_menu.derive(&self.account.id)
    }

    fn auth_error(&self, reason: impl Into<String>) -> HarnessError {
        HarnessError::Auth {
            account: self.account.id.clone(),
            reason: reason.into(),
        }
    }

    fn session_error(&self, reason: impl Into<String>) -> HarnessError {
        HarnessError::Session {
            account: self.account.id.clone(),
            reason: reason.into(),
        }
    }

    /// Sign in through the host's login form.
    pub async fn login(&mut self) -> HarnessResult<()> {
        let url = self.login_url()?;
        let timeouts = self.settings.timeouts;
        info!(account = %self.account.id, "Logging in");

        self.page
            .goto(&url)
            .await
            .map_err(|e| self.auth_error(format!("cannot open {url}: {e}")))?;

        let deadline = Deadline::after(timeouts.login, timeouts.poll_interval);
        let login_button = self.login_button();
        let button_index = wait_visible(self.page.as_mut(), &Scope::Page, &login_button, &deadline)
            .await
            .map_err(|e| self.auth_error(format!("login form not shown: {e}")))?;

        let host = self.settings.host.clone();
        let account = self.account.clone();

        let company = self.fill_labeled(&host.company_label, &account.company, &deadline).await?;
        if host.tab_after_company {
            // The host validates the company before enabling the username field
            self.page
                .press_tab(&Scope::Page, &Locator::Label(host.company_label.clone()), company)
                .await
                .map_err(|e| self.auth_error(format!("focus transfer failed: {e}")))?;
        }
        self.fill_labeled(&host.username_label, &account.id, &deadline).await?;
        self.fill_labeled(&host.password_label, account.pass.expose(), &deadline).await?;

        self.page
            .click(&Scope::Page, &login_button.locator, button_index)
            .await
            .map_err(|e| self.auth_error(format!("cannot submit login form: {e}")))?;

        let deadline = Deadline::after(timeouts.login, timeouts.poll_interval);
        wait_hidden(self.page.as_mut(), &Scope::Page, &login_button, &deadline)
            .await
            .map_err(|e| self.auth_error(format!("login form still displayed after submit: {e}")))?;

        self.authenticated = true;
        info!(account = %self.account.id, "Logged in");
        Ok(())
    }

    async fn fill_labeled(
        &mut self,
        label: &str,
        value: &str,
        deadline: &Deadline,
    ) -> HarnessResult<usize> {
        let field = Target::label(label);
        let index = wait_visible(self.page.as_mut(), &Scope::Page, &field, deadline)
            .await
            .map_err(|e| self.auth_error(format!("field '{label}' not available: {e}")))?;
        self.page
            .fill(&Scope::Page, &field.locator, index, value)
            .await
            .map_err(|e| self.auth_error(format!("cannot fill '{label}': {e}")))?;
        debug!(field = label, "filled");
        Ok(index)
    }

    /// Sign out through the user menu and wait for the login form.
    ///
    /// A missing user menu means the login never took effect and is reported
    /// as a session error rather than a verification failure.
    pub async fn logout(&mut self) -> HarnessResult<()> {
        let timeouts = self.settings.timeouts;
        let menu_name = self.user_menu_name();
        info!(account = %self.account.id, user_menu = %menu_name, "Logging out");

        let user_menu = Target::role(Role::Button, TextMatch::prefix(menu_name.clone()));
        let deadline = Deadline::after(timeouts.logout, timeouts.poll_interval);
        let index = wait_visible(self.page.as_mut(), &Scope::Page, &user_menu, &deadline)
            .await
            .map_err(|e| {
                self.session_error(format!(
                    "user menu '{menu_name}' not found, login did not take effect: {e}"
                ))
            })?;
        self.page
            .click(&Scope::Page, &user_menu.locator, index)
            .await
            .map_err(|e| self.session_error(format!("cannot open user menu: {e}")))?;

        let sign_out = Target::role(
            Role::MenuItem,
            TextMatch::exact(&self.settings.host.sign_out_label),
        );
        let deadline = Deadline::after(timeouts.logout, timeouts.poll_interval);
        let index = wait_visible(self.page.as_mut(), &Scope::Page, &sign_out, &deadline)
            .await
            .map_err(|e| self.session_error(format!("sign-out control not shown: {e}")))?;
        self.page
            .click(&Scope::Page, &sign_out.locator, index)
            .await
            .map_err(|e| self.session_error(format!("cannot sign out: {e}")))?;

        let deadline = Deadline::after(timeouts.logout, timeouts.poll_interval);
        let login_button = self.login_button();
        wait_visible(self.page.as_mut(), &Scope::Page, &login_button, &deadline)
            .await
            .map_err(|e| self.session_error(format!("login form did not reappear: {e}")))?;

        self.authenticated = false;
        self.frame = None;
        info!(account = %self.account.id, "Logged out");
        Ok(())
    }

    /// Tear down the browser context. Safe to call more than once.
    pub async fn close(&mut self) -> HarnessResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.frame = None;
        debug!(account = %self.account.id, "Closing browser context");
        self.page.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostProfile, Timeouts};
    use crate::sim::{HostScript, SimEvent, SimulatedHost};

    fn settings() -> Arc<Settings> {
        let mut host = HostProfile::default();
        host.user_menu.prefix = "User ".to_string();
        host.user_menu.skip = 4;
        Arc::new(Settings::new("http://portal.test/", host, Timeouts::default()))
    }

    fn script() -> HostScript {
        HostScript::new(settings().host.clone())
    }

    fn account() -> Arc<Account> {
        Arc::new(Account::new("TESTER01", "Acme Corp", "secret"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_url_carries_return_path() {
        let host = SimulatedHost::new(script());
        let session = Session::open(&host, account(), settings()).await.unwrap();
        assert_eq!(
            session.login_url().unwrap(),
            "http://portal.test/login?ReturnUrl=%2F"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_then_logout_shows_login_form_again() {
        let host = SimulatedHost::new(script().with_account(&account()));
        let mut session = Session::open(&host, account(), settings()).await.unwrap();

        session.login().await.unwrap();
        assert!(session.is_authenticated());

        session.logout().await.unwrap();
        assert!(!session.is_authenticated());

        let login_button = session.login_button();
        let found = crate::target::locate(session.page(), &Scope::Page, &login_button)
            .await
            .unwrap();
        assert!(found.iter().any(|(_, e)| e.visible));
        assert!(host.events().contains(&SimEvent::SignedOut("TESTER01".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_without_form_is_auth_error() {
        let script = HostScript {
            login_form_hidden: true,
            ..script()
        };
        let host = SimulatedHost::new(script);
        let mut session = Session::open(&host, account(), settings()).await.unwrap();

        let err = session.login().await.unwrap_err();
        assert!(matches!(err, HarnessError::Auth { .. }), "got {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credentials_are_auth_error() {
        // The host does not know this account, so the form never goes away
        let host = SimulatedHost::new(script());
        let mut session = Session::open(&host, account(), settings()).await.unwrap();

        let err = session.login().await.unwrap_err();
        assert!(matches!(err, HarnessError::Auth { .. }));
        assert!(!session.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_without_login_is_session_error() {
        let host = SimulatedHost::new(script().with_account(&account()));
        let mut session = Session::open(&host, account(), settings()).await.unwrap();
        session.page().goto("http://portal.test/login").await.unwrap();

        let err = session.logout().await.unwrap_err();
        assert!(matches!(err, HarnessError::Session { .. }), "got {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_company_focus_transfer_is_required_by_host() {
        let mut host_settings = (*settings()).clone();
        host_settings.host.tab_after_company = false;
        let script = HostScript {
            require_tab_after_company: true,
            ..script().with_account(&account())
        };
        let host = SimulatedHost::new(script);
        let mut session = Session::open(&host, account(), Arc::new(host_settings))
            .await
            .unwrap();

        let err = session.login().await.unwrap_err();
        assert!(matches!(err, HarnessError::Auth { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let host = SimulatedHost::new(script());
        let mut session = Session::open(&host, account(), settings()).await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(host.events().iter().filter(|e| **e == SimEvent::Closed).count(), 1);
    }
}
