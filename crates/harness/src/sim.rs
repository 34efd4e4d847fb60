//! Simulated host application
//!
//! An in-memory stand-in for the legacy portal: a login screen, a shell with
//! a user menu and top-level menus, and a content frame that is injected some
//! time after a screen is opened. Timing uses `tokio::time`, so tests running
//! with paused time are deterministic.
//!
//! Faults (a frame that never attaches, menus that swallow clicks, a sign-out
//! control that does nothing) are switched on through [`HostScript`] fields.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::account::Account;
use crate::browser::{
    BrowserError, BrowserLauncher, BrowserPage, BrowserResult, ElementSnapshot, FrameHandle,
    Locator, Role, Scope,
};
use crate::config::HostProfile;
use crate::target::normalize_text;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// A login the simulated host accepts.
#[derive(Debug, Clone)]
pub struct SimAccount {
    pub id: String,
    pub company: String,
    pub pass: String,
    pub role: Option<String>,
}

/// One element of a legacy screen.
#[derive(Debug, Clone)]
pub struct SimElement {
    pub css: Vec<String>,
    pub role: Option<Role>,
    pub name: String,
    pub text: String,
    /// Delay after the frame content is ready
    pub appears_after: Duration,
    pub vanishes_after: Option<Duration>,
    pub displayed: bool,
    /// Account roles that see the element; empty means everyone
    pub visible_to: Vec<String>,
}

impl SimElement {
    pub fn css(selector: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            css: vec![selector.into()],
            role: None,
            name: text.clone(),
            text,
            appears_after: Duration::ZERO,
            vanishes_after: None,
            displayed: true,
            visible_to: Vec::new(),
        }
    }

    pub fn role(role: Role, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            css: Vec::new(),
            role: Some(role),
            text: name.clone(),
            name,
            appears_after: Duration::ZERO,
            vanishes_after: None,
            displayed: true,
            visible_to: Vec::new(),
        }
    }

    pub fn with_css(mut self, selector: impl Into<String>) -> Self {
        self.css.push(selector.into());
        self
    }

    pub fn appearing_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    pub fn vanishing_after(mut self, delay: Duration) -> Self {
        self.vanishes_after = Some(delay);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn visible_to(mut self, role: impl Into<String>) -> Self {
        self.visible_to.push(role.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct SimScreen {
    pub title: String,
    pub elements: Vec<SimElement>,
}

impl SimScreen {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            elements: Vec::new(),
        }
    }

    pub fn with(mut self, element: SimElement) -> Self {
        self.elements.push(element);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SimMenuItem {
    pub name: String,
    /// Screen loaded into the content frame; `None` for inert entries
    pub screen: Option<SimScreen>,
    pub visible_to: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SimMenu {
    pub button: String,
    pub items: Vec<SimMenuItem>,
}

impl SimMenu {
    pub fn new(button: impl Into<String>) -> Self {
        Self {
            button: button.into(),
            items: Vec::new(),
        }
    }

    pub fn item(mut self, name: impl Into<String>, screen: SimScreen) -> Self {
        self.items.push(SimMenuItem {
            name: name.into(),
            screen: Some(screen),
            visible_to: Vec::new(),
        });
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.items.push(SimMenuItem {
            name: name.into(),
            screen: None,
            visible_to: Vec::new(),
        });
        self
    }
}

/// Behaviour of the simulated host.
#[derive(Debug, Clone)]
pub struct HostScript {
    pub profile: HostProfile,
    pub accounts: Vec<SimAccount>,
    pub menus: Vec<SimMenu>,
    /// Appended to the user-menu button name
    pub user_menu_decoration: String,
    pub login_form_hidden: bool,
    /// Reject logins whose company field never lost focus
    pub require_tab_after_company: bool,
    pub frame_attach_delay: Duration,
    pub frame_ready_delay: Duration,
    pub frame_never_attaches: bool,
    /// Menu-item clicks that close the menu without opening anything
    pub ignored_menu_clicks: usize,
    /// How long the group overlay stays up after login
    pub overlay: Option<Duration>,
    /// The legacy screen posts back once, replacing its document, this long
    /// after it first became ready
    pub postback_after: Option<Duration>,
    pub launch_failure: bool,
    pub sign_out_broken: bool,
}

impl Default for HostScript {
    fn default() -> Self {
        Self::new(HostProfile::default())
    }
}

impl HostScript {
    pub fn new(profile: HostProfile) -> Self {
        Self {
            profile,
            accounts: Vec::new(),
            menus: Vec::new(),
            user_menu_decoration: " \u{25be}".to_string(),
            login_form_hidden: false,
            require_tab_after_company: false,
            frame_attach_delay: Duration::from_millis(500),
            frame_ready_delay: Duration::from_millis(300),
            frame_never_attaches: false,
            ignored_menu_clicks: 0,
            overlay: None,
            postback_after: None,
            launch_failure: false,
            sign_out_broken: false,
        }
    }

    pub fn with_account(mut self, account: &Account) -> Self {
        self.accounts.push(SimAccount {
            id: account.id.clone(),
            company: account.company.clone(),
            pass: account.pass.expose().to_string(),
            role: account.role.clone(),
        });
        self
    }

    pub fn with_menu(mut self, menu: SimMenu) -> Self {
        self.menus.push(menu);
        self
    }

    /// Add `screen` as an item named after its title under `button`.
    pub fn with_screen(mut self, button: &str, screen: SimScreen) -> Self {
        let position = match self.menus.iter().position(|m| m.button == button) {
            Some(position) => position,
            None => {
                self.menus.push(SimMenu::new(button));
                self.menus.len() - 1
            }
        };
        let name = screen.title.clone();
        self.menus[position] = self.menus[position].clone().item(name, screen);
        self
    }

    /// A small portal with the screens the bundled scenarios target.
    pub fn demo_portal(profile: HostProfile) -> Self {
        let ecn = SimScreen::new("ECN Detail")
            .with(SimElement::role(Role::Heading, "ECN Detail"))
            .with(SimElement::css("#statusBar", "Ready"))
            .with(
                SimElement::role(Role::Button, "Search")
                    .with_css("#searchButton")
                    .appearing_after(Duration::from_millis(800)),
            );
        let country = SimScreen::new("Country Information")
            .with(SimElement::role(Role::Heading, "Country Information"))
            .with(SimElement::role(Role::Textbox, "Country Code").with_css("#countryCode"))
            .with(
                SimElement::css(".results-grid tr", "Country Name")
                    .appearing_after(Duration::from_millis(1500)),
            )
            .with(
                SimElement::css(".results-grid tr", "Acme Territory")
                    .appearing_after(Duration::from_millis(1500)),
            )
            .with(SimElement::role(Role::Button, "Edit").visible_to("admin"));
        let tariffs = SimScreen::new("Global Tariffs")
            .with(SimElement::role(Role::Heading, "Global Tariffs"))
            .with(SimElement::role(Role::Button, "Export").visible_to("admin"));
        let quick = SimScreen::new("Global Tariffs (Quick Lookup)")
            .with(SimElement::role(Role::Heading, "Global Tariffs (Quick Lookup)"));

        Self {
            overlay: Some(Duration::from_secs(2)),
            ..Self::new(profile)
        }
        .with_menu(
            SimMenu::new("Content")
                .item("ECN Detail", ecn)
                .item("Country Information", country)
                .item("Global Tariffs", tariffs)
                .item("Global Tariffs (Quick Lookup)", quick),
        )
    }
}

/// Observable host-side events, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Launched,
    Navigated(String),
    LoggedIn(String),
    LoginRejected(String),
    ScreenOpened(String),
    SignedOut(String),
    Screenshot,
    Closed,
}

/// Launches [`SimulatedPage`]s against one shared [`HostScript`].
#[derive(Debug, Clone)]
pub struct SimulatedHost {
    script: Arc<HostScript>,
    events: Arc<Mutex<Vec<SimEvent>>>,
}

impl SimulatedHost {
    pub fn new(script: HostScript) -> Self {
        Self {
            script: Arc::new(script),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(&self) -> &HostScript {
        &self.script
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl BrowserLauncher for SimulatedHost {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        if self.script.launch_failure {
            return Err(BrowserError::Launch("simulated launch failure".to_string()));
        }
        self.events.lock().push(SimEvent::Launched);
        Ok(Box::new(SimulatedPage::new(
            self.script.clone(),
            self.events.clone(),
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Company,
    Username,
    Password,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    None,
    Field(Field),
    SubmitLogin,
    OpenUserMenu,
    SignOut,
    OpenMenu(usize),
    OpenItem(usize, usize),
}

#[derive(Debug, Clone)]
struct Node {
    role: Option<Role>,
    label: Option<String>,
    css: Vec<String>,
    name: String,
    text: String,
    visible: bool,
    action: Action,
}

impl Node {
    fn control(role: Role, name: &str, action: Action) -> Self {
        Self {
            role: Some(role),
            label: None,
            css: Vec::new(),
            name: name.to_string(),
            text: name.to_string(),
            visible: true,
            action,
        }
    }

    fn field(label: &str, field: Field, value: &str) -> Self {
        Self {
            role: Some(Role::Textbox),
            label: Some(label.to_string()),
            css: Vec::new(),
            name: label.to_string(),
            text: value.to_string(),
            visible: true,
            action: Action::Field(field),
        }
    }

    fn text(text: &str) -> Self {
        Self {
            role: None,
            label: None,
            css: Vec::new(),
            name: text.to_string(),
            text: text.to_string(),
            visible: true,
            action: Action::None,
        }
    }

    fn matches(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Css(selector) => self.css.iter().any(|c| c == selector),
            Locator::Role(role) => self.role == Some(*role),
            Locator::Label(label) => self
                .label
                .as_deref()
                .map_or(false, |l| normalize_text(l) == normalize_text(label)),
            Locator::Text(fragment) => self.text.contains(fragment.as_str()),
        }
    }

    fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot {
            name: self.name.clone(),
            text: self.text.clone(),
            visible: self.visible,
        }
    }
}

#[derive(Debug, Clone)]
struct SignedIn {
    id: String,
    role: Option<String>,
    at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct OpenScreen {
    menu: usize,
    item: usize,
    opened_at: Instant,
    generation: u64,
}

/// One simulated browser page.
pub struct SimulatedPage {
    script: Arc<HostScript>,
    events: Arc<Mutex<Vec<SimEvent>>>,
    at_login: bool,
    company: String,
    username: String,
    password: String,
    company_tabbed: bool,
    signed_in: Option<SignedIn>,
    user_menu_open: bool,
    open_menu: Option<usize>,
    screen: Option<OpenScreen>,
    generation: u64,
    ignored_clicks_left: usize,
    closed: bool,
}

fn allowed(visible_to: &[String], role: Option<&str>) -> bool {
    visible_to.is_empty() || role.map_or(false, |r| visible_to.iter().any(|v| v == r))
}

impl SimulatedPage {
    fn new(script: Arc<HostScript>, events: Arc<Mutex<Vec<SimEvent>>>) -> Self {
        let ignored_clicks_left = script.ignored_menu_clicks;
        Self {
            script,
            events,
            at_login: false,
            company: String::new(),
            username: String::new(),
            password: String::new(),
            company_tabbed: false,
            signed_in: None,
            user_menu_open: false,
            open_menu: None,
            screen: None,
            generation: 0,
            ignored_clicks_left,
            closed: false,
        }
    }

    fn record(&self, event: SimEvent) {
        self.events.lock().push(event);
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed {
            Err(BrowserError::Disconnected("page was closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn role(&self) -> Option<&str> {
        self.signed_in.as_ref().and_then(|s| s.role.as_deref())
    }

    fn attached_screen(&self) -> Option<&OpenScreen> {
        if self.script.frame_never_attaches || self.signed_in.is_none() {
            return None;
        }
        self.screen
            .as_ref()
            .filter(|s| s.opened_at.elapsed() >= self.script.frame_attach_delay)
    }

    fn ready_at(&self, screen: &OpenScreen) -> Instant {
        screen.opened_at + self.script.frame_attach_delay + self.script.frame_ready_delay
    }

    fn content_id(&self, screen: &OpenScreen) -> String {
        let posted_back = self
            .script
            .postback_after
            .map_or(false, |after| Instant::now() >= self.ready_at(screen) + after);
        if posted_back {
            format!("{}#{}.1", self.script.profile.content_frame, screen.generation)
        } else {
            format!("{}#{}", self.script.profile.content_frame, screen.generation)
        }
    }

    fn ready_screen(&self) -> Option<&OpenScreen> {
        self.attached_screen()
            .filter(|s| Instant::now() >= self.ready_at(s))
    }

    fn page_nodes(&self) -> Vec<Node> {
        let profile = &self.script.profile;
        let mut nodes = Vec::new();

        let Some(user) = &self.signed_in else {
            if self.at_login && !self.script.login_form_hidden {
                nodes.push(Node::field(&profile.company_label, Field::Company, &self.company));
                nodes.push(Node::field(&profile.username_label, Field::Username, &self.username));
                nodes.push(Node::field(&profile.password_label, Field::Password, ""));
                nodes.push(Node::control(Role::Button, &profile.login_button, Action::SubmitLogin));
            }
            return nodes;
        };

        let user_menu = format!(
            "{}{}",
            profile.user_menu.derive(&user.id),
            self.script.user_menu_decoration
        );
        nodes.push(Node::control(Role::Button, &user_menu, Action::OpenUserMenu));
        if self.user_menu_open {
            nodes.push(Node::control(Role::MenuItem, &profile.sign_out_label, Action::SignOut));
        }

        for (m, menu) in self.script.menus.iter().enumerate() {
            nodes.push(Node::control(Role::Button, &menu.button, Action::OpenMenu(m)));
            if self.open_menu == Some(m) {
                for (i, item) in menu.items.iter().enumerate() {
                    if allowed(&item.visible_to, user.role.as_deref()) {
                        nodes.push(Node::control(Role::MenuItem, &item.name, Action::OpenItem(m, i)));
                    }
                }
            }
        }

        if let Some(duration) = self.script.overlay {
            if user.at.elapsed() < duration {
                nodes.push(Node::text(&profile.overlay_text));
            }
        }
        nodes
    }

    fn frame_nodes(&self, frame: &FrameHandle) -> BrowserResult<Vec<Node>> {
        let screen = self
            .ready_screen()
            .ok_or_else(|| BrowserError::NoSuchFrame(frame.name.clone()))?;
        if self.content_id(screen) != frame.content_id {
            return Err(BrowserError::FrameReplaced(frame.name.clone()));
        }

        let since = Instant::now().saturating_duration_since(self.ready_at(screen));
        let Some(content) = self.script.menus[screen.menu].items[screen.item].screen.as_ref() else {
            return Ok(Vec::new());
        };
        let role = self.role();
        Ok(content
            .elements
            .iter()
            .filter(|e| allowed(&e.visible_to, role))
            .filter(|e| since >= e.appears_after)
            .filter(|e| e.vanishes_after.map_or(true, |v| since < v))
            .map(|e| Node {
                role: e.role,
                label: None,
                css: e.css.clone(),
                name: e.name.clone(),
                text: e.text.clone(),
                visible: e.displayed,
                action: Action::None,
            })
            .collect())
    }

    fn nodes(&self, scope: &Scope) -> BrowserResult<Vec<Node>> {
        match scope {
            Scope::Page => Ok(self.page_nodes()),
            Scope::Frame(frame) => self.frame_nodes(frame),
        }
    }

    fn nth(&self, scope: &Scope, locator: &Locator, index: usize) -> BrowserResult<Node> {
        self.nodes(scope)?
            .into_iter()
            .filter(|n| n.matches(locator))
            .nth(index)
            .ok_or_else(|| BrowserError::NoSuchElement(format!("{locator} #{index}")))
    }

    fn submit_login(&mut self) {
        let tab_ok = !self.script.require_tab_after_company || self.company_tabbed;
        let accepted = self
            .script
            .accounts
            .iter()
            .find(|a| a.id == self.username && a.pass == self.password && a.company == self.company)
            .cloned();
        match accepted {
            Some(account) if tab_ok => {
                self.record(SimEvent::LoggedIn(account.id.clone()));
                self.signed_in = Some(SignedIn {
                    id: account.id,
                    role: account.role,
                    at: Instant::now(),
                });
                self.at_login = false;
            }
            _ => self.record(SimEvent::LoginRejected(self.username.clone())),
        }
    }

    fn sign_out(&mut self) {
        self.user_menu_open = false;
        if self.script.sign_out_broken {
            return;
        }
        if let Some(user) = self.signed_in.take() {
            self.record(SimEvent::SignedOut(user.id));
        }
        self.at_login = true;
        self.open_menu = None;
        self.screen = None;
        self.company.clear();
        self.username.clear();
        self.password.clear();
        self.company_tabbed = false;
    }

    fn open_item(&mut self, menu: usize, item: usize) {
        self.open_menu = None;
        if self.ignored_clicks_left > 0 {
            self.ignored_clicks_left -= 1;
            return;
        }
        let Some(screen) = self.script.menus[menu].items[item].screen.as_ref() else {
            return;
        };
        self.record(SimEvent::ScreenOpened(screen.title.clone()));
        self.generation += 1;
        self.screen = Some(OpenScreen {
            menu,
            item,
            opened_at: Instant::now(),
            generation: self.generation,
        });
    }
}

#[async_trait]
impl BrowserPage for SimulatedPage {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        self.record(SimEvent::Navigated(url.to_string()));
        // Unauthenticated visits always land on the login form
        self.at_login = self.signed_in.is_none();
        self.user_menu_open = false;
        self.open_menu = None;
        self.screen = None;
        Ok(())
    }

    async fn query(&mut self, scope: &Scope, locator: &Locator) -> BrowserResult<Vec<ElementSnapshot>> {
        self.ensure_open()?;
        Ok(self
            .nodes(scope)?
            .iter()
            .filter(|n| n.matches(locator))
            .map(Node::snapshot)
            .collect())
    }

    async fn click(&mut self, scope: &Scope, locator: &Locator, index: usize) -> BrowserResult<()> {
        self.ensure_open()?;
        let node = self.nth(scope, locator, index)?;
        if !node.visible {
            return Err(BrowserError::NoSuchElement(format!(
                "{locator} #{index} is not interactable"
            )));
        }
        match node.action {
            Action::None | Action::Field(_) => {}
            Action::SubmitLogin => self.submit_login(),
            Action::OpenUserMenu => {
                self.user_menu_open = !self.user_menu_open;
                self.open_menu = None;
            }
            Action::SignOut => self.sign_out(),
            Action::OpenMenu(menu) => {
                self.open_menu = Some(menu);
                self.user_menu_open = false;
            }
            Action::OpenItem(menu, item) => self.open_item(menu, item),
        }
        Ok(())
    }

    async fn fill(
        &mut self,
        scope: &Scope,
        locator: &Locator,
        index: usize,
        value: &str,
    ) -> BrowserResult<()> {
        self.ensure_open()?;
        let node = self.nth(scope, locator, index)?;
        match node.action {
            Action::Field(Field::Company) => {
                self.company = value.to_string();
                self.company_tabbed = false;
            }
            Action::Field(Field::Username) => self.username = value.to_string(),
            Action::Field(Field::Password) => self.password = value.to_string(),
            _ => {
                return Err(BrowserError::Protocol(format!(
                    "{locator} #{index} is not a form control"
                )))
            }
        }
        Ok(())
    }

    async fn press_tab(&mut self, scope: &Scope, locator: &Locator, index: usize) -> BrowserResult<()> {
        self.ensure_open()?;
        let node = self.nth(scope, locator, index)?;
        if matches!(node.action, Action::Field(Field::Company)) {
            self.company_tabbed = true;
        }
        Ok(())
    }

    async fn frame_attached(&mut self, name: &str) -> BrowserResult<bool> {
        self.ensure_open()?;
        Ok(name == self.script.profile.content_frame && self.attached_screen().is_some())
    }

    async fn frame_content(&mut self, name: &str) -> BrowserResult<Option<FrameHandle>> {
        self.ensure_open()?;
        if name != self.script.profile.content_frame {
            return Ok(None);
        }
        Ok(self.ready_screen().map(|screen| FrameHandle {
            name: name.to_string(),
            content_id: self.content_id(screen),
        }))
    }

    async fn screenshot(
        &mut self,
        scope: &Scope,
        element: Option<(&Locator, usize)>,
    ) -> BrowserResult<Vec<u8>> {
        self.ensure_open()?;
        let mut description = format!("{scope}");
        if let Some((locator, index)) = element {
            let node = self.nth(scope, locator, index)?;
            description.push_str(&format!(" {}", node.name));
        } else {
            self.nodes(scope)?;
        }
        self.record(SimEvent::Screenshot);

        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(description.as_bytes());
        Ok(bytes)
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if !self.closed {
            self.closed = true;
            self.record(SimEvent::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new("TESTER01", "Acme Corp", "secret")
    }

    async fn signed_in_page(script: HostScript) -> (SimulatedHost, Box<dyn BrowserPage>) {
        let host = SimulatedHost::new(script.with_account(&account()));
        let mut page = host.launch().await.unwrap();
        page.goto("http://portal.test/login").await.unwrap();
        for (label, value) in [("Company", "Acme Corp"), ("Username", "TESTER01"), ("Password", "secret")] {
            page.fill(&Scope::Page, &Locator::Label(label.into()), 0, value)
                .await
                .unwrap();
        }
        let login = page
            .query(&Scope::Page, &Locator::Role(Role::Button))
            .await
            .unwrap();
        assert_eq!(login.len(), 1);
        page.click(&Scope::Page, &Locator::Role(Role::Button), 0)
            .await
            .unwrap();
        (host, page)
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_shows_decorated_user_menu() {
        let (host, mut page) = signed_in_page(HostScript::default()).await;
        let buttons = page
            .query(&Scope::Page, &Locator::Role(Role::Button))
            .await
            .unwrap();
        assert_eq!(buttons[0].name, "TESTER01 \u{25be}");
        assert!(host.events().contains(&SimEvent::LoggedIn("TESTER01".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_attaches_then_loads() {
        let script = HostScript::default().with_screen("Content", SimScreen::new("ECN Detail"));
        let (_host, mut page) = signed_in_page(script).await;

        // buttons: user menu, Content
        page.click(&Scope::Page, &Locator::Role(Role::Button), 1).await.unwrap();
        page.click(&Scope::Page, &Locator::Role(Role::MenuItem), 0).await.unwrap();
        assert!(!page.frame_attached("contentFrame").await.unwrap());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(page.frame_attached("contentFrame").await.unwrap());
        assert!(page.frame_content("contentFrame").await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let handle = page.frame_content("contentFrame").await.unwrap().unwrap();
        assert_eq!(handle.content_id, "contentFrame#1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_page_is_disconnected() {
        let host = SimulatedHost::new(HostScript::default());
        let mut page = host.launch().await.unwrap();
        page.close().await.unwrap();
        let err = page.goto("http://portal.test/").await.unwrap_err();
        assert!(matches!(err, BrowserError::Disconnected(_)));
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let host = SimulatedHost::new(HostScript {
            launch_failure: true,
            ..HostScript::default()
        });
        assert!(matches!(host.launch().await, Err(BrowserError::Launch(_))));
    }
}
