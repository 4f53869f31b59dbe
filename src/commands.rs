//! Backend, AI and calendar subcommands. Every command runs against the
//! profile's [`SessionKey`] and prints the service's answer as JSON.

use anyhow::Result;
use arc_swap::ArcSwap;
use clap::Subcommand;
use mailbridge_auth::{GoogleCredential, GoogleOAuthClient, GrantManager};
use mailbridge_calendar::{
    CalendarClient, CalendarClientFactory, EventListQuery, GoogleCalendarFactory, PRIMARY,
    model::DEFAULT_MAX_RESULTS,
};
use mailbridge_client::{
    ApiClient,
    account::{LoginRequest, SignupRequest},
    ai::{ComposeRequest, EmailBodyRequest, ImproveRequest},
    campaigns::{CampaignCreate, CampaignStatus, Lead},
    dashboard::DEFAULT_ACTIVITY_LIMIT,
    emails::{EmailDraft, Folder, Page},
    newsletters::NewsletterCreate,
};
use mailbridge_config::Config;
use mailbridge_types::{SessionKey, TokenStore};
use secrecy::SecretString;
use serde::Serialize;
use std::{sync::Arc, time::Duration};

/// What every non-server command needs: configuration, the local token
/// store and the profile to act for.
pub struct Session {
    config: Config,
    store: Arc<dyn TokenStore>,
    key: SessionKey,
    http: reqwest::Client,
}

impl Session {
    pub fn new(config: Config, store: Arc<dyn TokenStore>, key: SessionKey) -> Self {
        Self {
            config,
            store,
            key,
            http: reqwest::Client::new(),
        }
    }

    fn backend(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(
            self.http.clone(),
            self.config.backend_url()?,
            Arc::clone(&self.store),
            self.key.clone(),
        ))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Subcommand, Debug)]
pub enum AccountCmd {
    /// Sign in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create a password account and sign in.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Show the signed-in user.
    Me,
    /// Check that the backend is up.
    Health,
}

pub async fn account(session: &Session, cmd: AccountCmd) -> Result<()> {
    let client = session.backend()?;
    let api = client.account();
    match cmd {
        AccountCmd::Login { email, password } => {
            let resp = api.login(&LoginRequest { email, password }).await?;
            eprintln!("signed in as {}", resp.user.email);
            print_json(&resp.user)
        }
        AccountCmd::Signup {
            email,
            username,
            password,
        } => {
            let resp = api
                .signup(&SignupRequest {
                    email,
                    username,
                    password,
                })
                .await?;
            print_json(&resp.user)
        }
        AccountCmd::Me => print_json(&api.me().await?),
        AccountCmd::Health => print_json(&api.health().await?),
    }
}

#[derive(Subcommand, Debug)]
pub enum EmailCmd {
    /// Send a message.
    Send {
        #[arg(long)]
        to: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// List a folder.
    List {
        /// inbox, sent, drafts, archived or trash.
        #[arg(default_value = "inbox")]
        folder: Folder,
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    Get {
        id: i64,
    },
    Delete {
        id: i64,
    },
    Archive {
        id: i64,
    },
    /// Move a message to the trash.
    Trash {
        id: i64,
    },
    /// Bring a message back from the trash.
    Restore {
        id: i64,
    },
}

pub async fn email(session: &Session, cmd: EmailCmd) -> Result<()> {
    let client = session.backend()?;
    let api = client.emails();
    match cmd {
        EmailCmd::Send { to, subject, body } => {
            let draft = EmailDraft {
                recipient: to,
                subject,
                body,
            };
            print_json(&api.compose(draft).await?)
        }
        EmailCmd::List {
            folder,
            skip,
            limit,
        } => print_json(&api.list(folder, Page { skip, limit }).await?),
        EmailCmd::Get { id } => print_json(&api.get(id).await?),
        EmailCmd::Delete { id } => print_json(&api.delete(id).await?),
        EmailCmd::Archive { id } => print_json(&api.archive(id).await?),
        EmailCmd::Trash { id } => print_json(&api.move_to_trash(id).await?),
        EmailCmd::Restore { id } => print_json(&api.restore(id).await?),
    }
}

#[derive(Subcommand, Debug)]
pub enum NewsletterCmd {
    List {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    Get {
        id: i64,
    },
    /// Send a newsletter to every subscriber.
    Send {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: Option<String>,
    },
    Delete {
        id: i64,
    },
}

pub async fn newsletter(session: &Session, cmd: NewsletterCmd) -> Result<()> {
    let client = session.backend()?;
    let api = client.newsletters();
    match cmd {
        NewsletterCmd::List { skip, limit } => print_json(&api.list(Page { skip, limit }).await?),
        NewsletterCmd::Get { id } => print_json(&api.get(id).await?),
        NewsletterCmd::Send { title, content } => {
            print_json(&api.send(&NewsletterCreate { title, content }).await?)
        }
        NewsletterCmd::Delete { id } => print_json(&api.delete(id).await?),
    }
}

#[derive(Subcommand, Debug)]
pub enum AiCmd {
    /// Draft an email from a prompt.
    Compose {
        prompt: String,
        #[arg(long)]
        tone: Option<String>,
    },
    /// Rewrite text.
    Improve {
        text: String,
        #[arg(long)]
        instruction: Option<String>,
    },
    /// Suggest subject lines for a body.
    Subjects {
        body: String,
        #[arg(long)]
        count: Option<u32>,
    },
    Summarize {
        body: String,
    },
    /// Suggest short replies to a message.
    Replies {
        body: String,
        #[arg(long)]
        count: Option<u32>,
    },
}

pub async fn ai(session: &Session, cmd: AiCmd) -> Result<()> {
    let client = session.backend()?.rebased(session.config.ai_url()?);
    let api = client.ai();
    match cmd {
        AiCmd::Compose { prompt, tone } => {
            print_json(&api.compose(&ComposeRequest { prompt, tone }).await?)
        }
        AiCmd::Improve { text, instruction } => {
            print_json(&api.improve(&ImproveRequest { text, instruction }).await?)
        }
        AiCmd::Subjects { body, count } => print_json(
            &api.subject_lines(&EmailBodyRequest {
                email_body: body,
                count,
            })
            .await?,
        ),
        AiCmd::Summarize { body } => print_json(&api.summarize(&body).await?),
        AiCmd::Replies { body, count } => print_json(
            &api.smart_replies(&EmailBodyRequest {
                email_body: body,
                count,
            })
            .await?,
        ),
    }
}

/// One dashboard snapshot, or a refresh every `watch` seconds until Ctrl-C.
pub async fn dashboard(session: &Session, watch: Option<u64>) -> Result<()> {
    let client = session.backend()?;
    let Some(secs) = watch.filter(|s| *s > 0) else {
        return print_dashboard(&client).await;
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = print_dashboard(&client).await {
                    tracing::warn!(error = %e, "dashboard refresh failed");
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn print_dashboard(client: &ApiClient) -> Result<()> {
    let api = client.dashboard();
    let (stats, activities, campaigns) = tokio::try_join!(
        api.stats(),
        api.activities(DEFAULT_ACTIVITY_LIMIT),
        api.campaigns_summary(),
    )?;
    print_json(&serde_json::json!({
        "stats": stats,
        "activities": activities,
        "campaigns": campaigns,
    }))
}

#[derive(Subcommand, Debug)]
pub enum CampaignCmd {
    List {
        /// draft, running, paused or completed.
        #[arg(long)]
        status: Option<CampaignStatus>,
    },
    Get {
        id: String,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    Start {
        id: String,
    },
    Pause {
        id: String,
    },
    /// Mark a campaign completed.
    Stop {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Add one lead to a campaign.
    AddLead {
        id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        title: Option<String>,
    },
    Leads {
        id: String,
        #[arg(long)]
        status: Option<String>,
    },
}

pub async fn campaign(session: &Session, cmd: CampaignCmd) -> Result<()> {
    let client = session.backend()?;
    let api = client.campaigns();
    match cmd {
        CampaignCmd::List { status } => {
            print_json(&api.list(status.map(CampaignStatus::as_str)).await?)
        }
        CampaignCmd::Get { id } => print_json(&api.get(&id).await?),
        CampaignCmd::Create {
            name,
            description,
            subject,
            body,
        } => {
            let campaign = CampaignCreate {
                name,
                description,
                subject_template: subject,
                body_template: body,
            };
            print_json(&api.create(&campaign).await?)
        }
        CampaignCmd::Start { id } => print_json(&api.start(&id).await?),
        CampaignCmd::Pause { id } => print_json(&api.pause(&id).await?),
        CampaignCmd::Stop { id } => print_json(&api.stop(&id).await?),
        CampaignCmd::Delete { id } => {
            api.delete(&id).await?;
            eprintln!("campaign {id} deleted");
            Ok(())
        }
        CampaignCmd::AddLead {
            id,
            email,
            name,
            company,
            title,
        } => {
            let lead = Lead {
                email,
                name,
                company,
                title,
            };
            print_json(&api.add_leads(&id, &[lead]).await?)
        }
        CampaignCmd::Leads { id, status } => print_json(&api.leads(&id, status.as_deref()).await?),
    }
}

#[derive(Subcommand, Debug)]
pub enum CalendarCmd {
    /// Upcoming events on a calendar.
    List {
        #[arg(long, default_value = PRIMARY)]
        calendar: String,
        /// RFC 3339 lower bound (default: now).
        #[arg(long)]
        from: Option<String>,
        /// RFC 3339 upper bound.
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max: u32,
    },
    /// Calendars the account can see.
    Calendars,
    /// Create an event from a sentence, e.g. "Lunch with Ada tomorrow 1pm".
    QuickAdd {
        text: String,
        #[arg(long, default_value = PRIMARY)]
        calendar: String,
    },
}

/// Calendar commands use the Google grant stored by `login`, refreshing it
/// first when it has expired.
pub async fn calendar(session: &Session, cmd: CalendarCmd) -> Result<()> {
    let calendar = calendar_client(session).await?;
    match cmd {
        CalendarCmd::List {
            calendar: calendar_id,
            from,
            to,
            max,
        } => {
            let query = EventListQuery {
                calendar_id,
                time_min: from,
                time_max: to,
                max_results: max,
            };
            print_json(&calendar.list_events(&query).await?)
        }
        CalendarCmd::Calendars => print_json(&calendar.list_calendars().await?),
        CalendarCmd::QuickAdd {
            text,
            calendar: calendar_id,
        } => print_json(&calendar.quick_add(&calendar_id, &text).await?),
    }
}

async fn calendar_client(session: &Session) -> Result<Box<dyn CalendarClient>> {
    let (client_id, client_secret) = session.config.google_client()?;
    let grants = GrantManager::new(
        Arc::clone(&session.store),
        session.http.clone(),
        Arc::new(ArcSwap::from_pointee(session.config.clone())),
    );
    let grant = grants.get_grant(&session.key).await?;
    let credential = GoogleCredential::from_token(&grant)
        .ok_or_else(|| anyhow::anyhow!("no Google grant for {}; run `mailbridge login`", session.key))?;
    let oauth = GoogleOAuthClient::new(
        client_id,
        SecretString::from(client_secret.to_string()),
        credential,
    );
    let factory =
        GoogleCalendarFactory::new(session.http.clone(), session.config.google.api_base.clone());
    Ok(factory.build(oauth))
}
