//! In-memory repository doubles and fixtures for service and HTTP tests.
//!
//! [`InMemoryDatabase`] implements every repository trait over plain vectors
//! behind one mutex, mirroring the Postgres implementations' soft-delete
//! filtering, case-insensitive uniqueness, ordering and the running-timer
//! unique index.

use crate::auth::context::UserContext;
use crate::auth::rbac::Role;
use crate::auth::session::{UserSession, SESSION_COOKIE};
use crate::error::ApiError;
use crate::models::{
    compute_duration_seconds, Attachment, Message, NewAttachment, NewMessage, NewTicket, NewUser,
    PageRequest, Ticket, TicketFilter, TicketPriority, TicketScope, TicketStatus, TimeLog, User,
    UserFilter, UserUpdate,
};
use crate::repositories::time_log_repo::TIMER_ALREADY_RUNNING;
use crate::repositories::{
    AttachmentRepository, MessageRepository, Repositories, TicketRepository, TimeLogRepository,
    UserRepository,
};
use crate::utils::crypto::hash_password;
use async_trait::async_trait;
use axum::http::header::SET_COOKIE;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use uuid::Uuid;

/// Password of every fixture account.
pub const TEST_PASSWORD: &str = "correct-horse";

fn test_password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| match hash_password(TEST_PASSWORD) {
        Ok(hash) => hash,
        Err(e) => panic!("hashing the fixture password failed: {}", e),
    })
    .clone()
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    roles: HashMap<Uuid, Vec<Role>>,
    tickets: Vec<Ticket>,
    messages: Vec<Message>,
    attachments: Vec<Attachment>,
    time_logs: Vec<TimeLog>,
}

#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Mutex<Tables>,
    fail_message_writes: Mutex<bool>,
}

impl InMemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            users: self.clone(),
            tickets: self.clone(),
            messages: self.clone(),
            attachments: self.clone(),
            time_logs: self.clone(),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next message transactions fail, as a rolled-back commit would.
    pub fn fail_message_writes(&self, fail: bool) {
        *self
            .fail_message_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = fail;
    }

    fn insert_user(&self, username: &str, company: bool, active: bool, roles: &[Role]) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            full_name: format!("{} Example", capitalize(username)),
            password_hash: test_password_hash(),
            is_company_member: company,
            is_active: active,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            deleted_at: None,
        };
        let mut tables = self.tables();
        tables.roles.insert(user.id, roles.to_vec());
        tables.users.push(user.clone());
        user
    }

    pub fn add_customer(&self, username: &str) -> User {
        self.insert_user(username, false, true, &[Role::Customer])
    }

    /// A self-registered customer still waiting for confirmation.
    pub fn add_inactive_customer(&self, username: &str) -> User {
        self.insert_user(username, false, false, &[Role::Customer])
    }

    pub fn add_staff(&self, username: &str, roles: &[Role]) -> User {
        self.insert_user(username, true, true, roles)
    }

    pub fn add_admin(&self, username: &str) -> User {
        self.insert_user(username, true, true, &[Role::Admin])
    }

    /// Request context for a fixture user, as the auth middleware builds it.
    pub fn context(&self, user: &User) -> UserContext {
        let roles = self.tables().roles.get(&user.id).cloned().unwrap_or_default();
        UserContext::new_user(user, roles)
    }

    /// Ticket opened by `creator` for themselves, optionally already assigned.
    pub fn add_ticket(&self, creator: &User, assignee: Option<Uuid>) -> Ticket {
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            title: "Fixture ticket".to_string(),
            description: "Created by the test fixture".to_string(),
            status: TicketStatus::InProgress,
            priority: TicketPriority::Medium,
            created_by_id: creator.id,
            assigned_to_id: assignee,
            customer_id: Some(creator.id),
            created_at: now,
            updated_at: now,
            last_activity_at: Some(now),
            deleted_at: None,
        };
        self.tables().tickets.push(ticket.clone());
        ticket
    }

    pub fn insert_finished_time_log(&self, ticket_id: Uuid, user_id: Uuid, seconds: i64) {
        let end = Utc::now();
        let start = end - Duration::seconds(seconds);
        self.tables().time_logs.push(TimeLog {
            id: Uuid::new_v4(),
            ticket_id,
            user_id,
            start_time: start,
            end_time: Some(end),
            total_duration_seconds: Some(seconds),
            created_at: start,
            deleted_at: None,
        });
    }

    /// Raw row, soft-deleted or not.
    pub fn user(&self, id: Uuid) -> Option<User> {
        self.tables().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn ticket(&self, id: Uuid) -> Option<Ticket> {
        self.tables().tickets.iter().find(|t| t.id == id).cloned()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.tables().messages.clone()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.tables().attachments.clone()
    }

    pub fn time_logs(&self) -> Vec<TimeLog> {
        self.tables().time_logs.clone()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn page_slice<T: Clone>(rows: &[T], page: PageRequest) -> Vec<T> {
    rows.iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect()
}

fn user_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("User {} not found", id))
}

fn ticket_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Ticket {} not found", id))
}

/// Mirrors the unique indexes on `LOWER(username)` and `LOWER(email)`,
/// which cover soft-deleted rows too.
fn check_unique(
    users: &[User],
    username: &str,
    email: &str,
    except: Option<Uuid>,
) -> Result<(), ApiError> {
    let taken = users.iter().filter(|u| Some(u.id) != except).any(|u| {
        u.username.to_lowercase() == username.to_lowercase()
            || u.email.to_lowercase() == email.to_lowercase()
    });
    if taken {
        Err(ApiError::Conflict(
            "username or email is already in use".to_string(),
        ))
    } else {
        Ok(())
    }
}

fn live_user_mut(tables: &mut Tables, id: Uuid) -> Result<&mut User, ApiError> {
    tables
        .users
        .iter_mut()
        .find(|u| u.id == id && u.deleted_at.is_none())
        .ok_or_else(|| user_not_found(id))
}

#[async_trait]
impl UserRepository for InMemoryDatabase {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.id == id && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        let wanted = username.to_lowercase();
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.username.to_lowercase() == wanted && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_for_display(&self, ids: &[Uuid]) -> Result<Vec<User>, ApiError> {
        Ok(self
            .tables()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, i64), ApiError> {
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let mut rows: Vec<User> = self
            .tables()
            .users
            .iter()
            .filter(|u| u.deleted_at.is_none())
            .filter(|u| {
                filter
                    .is_company_member
                    .map_or(true, |company| u.is_company_member == company)
            })
            .filter(|u| {
                needle.as_deref().map_or(true, |n| {
                    u.username.to_lowercase().contains(n)
                        || u.email.to_lowercase().contains(n)
                        || u.full_name.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rows.len() as i64;
        Ok((page_slice(&rows, page), total))
    }

    async fn create(&self, user: &NewUser, roles: &[Role]) -> Result<User, ApiError> {
        let mut tables = self.tables();
        check_unique(&tables.users, &user.username, &user.email, None)?;

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            password_hash: user.password_hash.clone(),
            is_company_member: user.is_company_member,
            is_active: user.is_active,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            deleted_at: None,
        };
        tables.roles.insert(created.id, roles.to_vec());
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<User, ApiError> {
        let mut tables = self.tables();
        check_unique(&tables.users, &update.username, &update.email, Some(id))?;

        let user = live_user_mut(&mut tables, id)?;
        user.username = update.username.clone();
        user.email = update.email.clone();
        user.full_name = update.full_name.clone();
        user.is_company_member = update.is_company_member;
        user.is_active = update.is_active;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), ApiError> {
        let mut tables = self.tables();
        let user = live_user_mut(&mut tables, id)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), ApiError> {
        let mut tables = self.tables();
        let user = live_user_mut(&mut tables, id)?;
        user.is_active = is_active;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), ApiError> {
        let mut tables = self.tables();
        let user = live_user_mut(&mut tables, id)?;
        user.deleted_at = Some(at);
        user.is_active = false;
        user.updated_at = at;
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), ApiError> {
        if let Some(user) = self.tables().users.iter_mut().find(|u| u.id == id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_user_roles(&self, id: Uuid) -> Result<Vec<Role>, ApiError> {
        let mut roles = self.tables().roles.get(&id).cloned().unwrap_or_default();
        roles.sort_by_key(|r| r.as_str());
        Ok(roles)
    }

    async fn set_user_roles(
        &self,
        id: Uuid,
        roles: &[Role],
        _assigned_by: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let mut deduped: Vec<Role> = Vec::with_capacity(roles.len());
        for role in roles {
            if !deduped.contains(role) {
                deduped.push(*role);
            }
        }
        self.tables().roles.insert(id, deduped);
        Ok(())
    }
}

#[async_trait]
impl TicketRepository for InMemoryDatabase {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ticket>, ApiError> {
        Ok(self
            .tables()
            .tickets
            .iter()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .cloned())
    }

    async fn list(
        &self,
        scope: TicketScope,
        filter: &TicketFilter,
        page: PageRequest,
    ) -> Result<(Vec<Ticket>, i64), ApiError> {
        let mut rows: Vec<Ticket> = self
            .tables()
            .tickets
            .iter()
            .filter(|t| t.deleted_at.is_none() && scope.includes(t) && filter.matches(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rows.len() as i64;
        Ok((page_slice(&rows, page), total))
    }

    async fn create(&self, ticket: &NewTicket) -> Result<Ticket, ApiError> {
        let now = Utc::now();
        let created = Ticket {
            id: Uuid::new_v4(),
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            status: TicketStatus::InProgress,
            priority: ticket.priority,
            created_by_id: ticket.created_by_id,
            assigned_to_id: None,
            customer_id: Some(ticket.customer_id),
            created_at: now,
            updated_at: now,
            last_activity_at: Some(now),
            deleted_at: None,
        };
        self.tables().tickets.push(created.clone());
        Ok(created)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Ticket, ApiError> {
        let mut tables = self.tables();
        let ticket = tables
            .tickets
            .iter_mut()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .ok_or_else(|| ticket_not_found(id))?;
        ticket.status = status;
        ticket.updated_at = at;
        ticket.last_activity_at = Some(at);
        Ok(ticket.clone())
    }

    async fn update_assignee(
        &self,
        id: Uuid,
        assignee: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<Ticket, ApiError> {
        let mut tables = self.tables();
        let ticket = tables
            .tickets
            .iter_mut()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .ok_or_else(|| ticket_not_found(id))?;
        ticket.assigned_to_id = assignee;
        ticket.updated_at = at;
        Ok(ticket.clone())
    }
}

#[async_trait]
impl MessageRepository for InMemoryDatabase {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, ApiError> {
        Ok(self
            .tables()
            .messages
            .iter()
            .find(|m| m.id == id && m.deleted_at.is_none())
            .cloned())
    }

    async fn list_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<Message>, ApiError> {
        let mut rows: Vec<Message> = self
            .tables()
            .messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id && m.deleted_at.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        Ok(rows)
    }

    async fn create_with_attachments(
        &self,
        message: &NewMessage,
        attachments: &[NewAttachment],
        customer_reply: bool,
    ) -> Result<(Message, Vec<Attachment>), ApiError> {
        if *self
            .fail_message_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(ApiError::internal("simulated transaction failure"));
        }

        let created = Message {
            id: message.id,
            ticket_id: message.ticket_id,
            content: message.content.clone(),
            sent_by_id: message.sent_by_id,
            sent_at: message.sent_at,
            deleted_at: None,
        };
        let stored: Vec<Attachment> = attachments
            .iter()
            .map(|a| Attachment {
                id: a.id,
                message_id: message.id,
                file_name: a.file_name.clone(),
                file_path: a.file_path.clone(),
                size: a.size,
                content_type: a.content_type.clone(),
                created_at: message.sent_at,
                deleted_at: None,
            })
            .collect();

        let mut tables = self.tables();
        if customer_reply {
            if let Some(ticket) = tables
                .tickets
                .iter_mut()
                .find(|t| t.id == message.ticket_id && t.deleted_at.is_none())
            {
                ticket.status = TicketStatus::CustomerReplied;
                ticket.last_activity_at = Some(message.sent_at);
                ticket.updated_at = message.sent_at;
            }
        }
        tables.messages.push(created.clone());
        tables.attachments.extend(stored.iter().cloned());

        Ok((created, stored))
    }
}

#[async_trait]
impl AttachmentRepository for InMemoryDatabase {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>, ApiError> {
        Ok(self
            .tables()
            .attachments
            .iter()
            .find(|a| a.id == id && a.deleted_at.is_none())
            .cloned())
    }

    async fn list_by_messages(&self, message_ids: &[Uuid]) -> Result<Vec<Attachment>, ApiError> {
        let mut rows: Vec<Attachment> = self
            .tables()
            .attachments
            .iter()
            .filter(|a| message_ids.contains(&a.message_id) && a.deleted_at.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(rows)
    }
}

#[async_trait]
impl TimeLogRepository for InMemoryDatabase {
    async fn find_running(
        &self,
        user_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<Option<TimeLog>, ApiError> {
        Ok(self
            .tables()
            .time_logs
            .iter()
            .find(|l| {
                l.user_id == user_id
                    && l.ticket_id == ticket_id
                    && l.end_time.is_none()
                    && l.deleted_at.is_none()
            })
            .cloned())
    }

    async fn start(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<TimeLog, ApiError> {
        let mut tables = self.tables();
        let running = tables.time_logs.iter().any(|l| {
            l.user_id == user_id
                && l.ticket_id == ticket_id
                && l.end_time.is_none()
                && l.deleted_at.is_none()
        });
        if running {
            return Err(ApiError::Conflict(TIMER_ALREADY_RUNNING.to_string()));
        }

        let log = TimeLog {
            id: Uuid::new_v4(),
            ticket_id,
            user_id,
            start_time: at,
            end_time: None,
            total_duration_seconds: None,
            created_at: at,
            deleted_at: None,
        };
        tables.time_logs.push(log.clone());
        Ok(log)
    }

    async fn stop(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<TimeLog>, ApiError> {
        let mut tables = self.tables();
        let Some(log) = tables.time_logs.iter_mut().find(|l| {
            l.id == id && l.user_id == user_id && l.end_time.is_none() && l.deleted_at.is_none()
        }) else {
            return Ok(None);
        };

        log.end_time = Some(at);
        log.total_duration_seconds = Some(compute_duration_seconds(log.start_time, at));
        Ok(Some(log.clone()))
    }

    async fn list_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<TimeLog>, ApiError> {
        let mut rows: Vec<TimeLog> = self
            .tables()
            .time_logs
            .iter()
            .filter(|l| l.ticket_id == ticket_id && l.deleted_at.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(rows)
    }
}

/// `name=value` pair of an encrypted session cookie for `user`, ready to be
/// sent in a `Cookie` request header.
pub fn session_cookie(key: &Key, user: &User, lifetime_seconds: u64) -> String {
    let session = UserSession::new(user.id, user.username.clone(), lifetime_seconds);
    encrypted_cookie(key, &session)
}

/// Same as [`session_cookie`] for an arbitrary payload, e.g. an expired one.
pub fn encrypted_cookie(key: &Key, session: &UserSession) -> String {
    let value = match serde_json::to_string(session) {
        Ok(value) => value,
        Err(e) => panic!("session serialization failed: {}", e),
    };
    let jar = PrivateCookieJar::new(key.clone()).add(Cookie::new(SESSION_COOKIE, value));
    let response = jar.into_response();

    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
        .unwrap_or_default()
}
