use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{
    CreateServer, Member, MemberRole, Page, Server, ServerDetails, ServerSummary, UpdateServer,
};
use crate::services::{require_manager, require_member, require_server};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

const INVITE_CODE_LEN: usize = 10;

fn new_invite_code() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(INVITE_CODE_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct ServerService {
    store: Arc<dyn Store>,
}

impl ServerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates the server with its `general` channel and the caller as OWNER.
    pub async fn create(&self, profile_id: Uuid, input: CreateServer) -> Result<ServerDetails> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Server name is required".to_string()));
        }

        let (server, member, general) = self
            .store
            .create_server(profile_id, name, input.image_url.as_deref(), &new_invite_code())
            .await?;

        tracing::info!(server_id = %server.id, %profile_id, "Server created");
        Ok(ServerDetails {
            server,
            member,
            channels: vec![general],
        })
    }

    /// Join as GUEST. Joining a server you already belong to returns the existing membership.
    pub async fn join_by_invite(&self, profile_id: Uuid, code: &str) -> Result<ServerDetails> {
        let server = self
            .store
            .server_by_invite_code(code)
            .await?
            .ok_or_else(|| AppError::not_found("Invalid invite code"))?;

        let member = match self.store.member_in_server(server.id, profile_id).await? {
            Some(existing) => existing,
            None => match self
                .store
                .add_member(server.id, profile_id, MemberRole::Guest)
                .await
            {
                Ok(member) => {
                    tracing::info!(server_id = %server.id, %profile_id, "Member joined");
                    member
                }
                // Lost a race with a concurrent join of the same profile
                Err(AppError::Conflict(_)) => self
                    .store
                    .member_in_server(server.id, profile_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Member not found"))?,
                Err(e) => return Err(e),
            },
        };

        let channels = self.store.channels_of_server(server.id).await?;
        Ok(ServerDetails {
            server,
            member,
            channels,
        })
    }

    pub async fn regenerate_invite_code(&self, server_id: Uuid, profile_id: Uuid) -> Result<Server> {
        require_server(self.store.as_ref(), server_id).await?;
        require_manager(self.store.as_ref(), server_id, profile_id).await?;
        self.store.set_invite_code(server_id, &new_invite_code()).await
    }

    /// One page of the profile's servers, each with its unread badge from one
    /// batched aggregate.
    pub async fn list_for_profile(&self, profile_id: Uuid, skip: i64, limit: i64) -> Result<Page<ServerSummary>> {
        let memberships = self.store.servers_for_profile(profile_id, skip, limit).await?;
        let total = self.store.count_servers_for_profile(profile_id).await?;
        let unread = self.store.unread_by_server(profile_id).await?;

        let data = memberships
            .into_iter()
            .map(|(server, member)| ServerSummary {
                unread_count: unread.get(&server.id).copied().unwrap_or(0),
                id: server.id,
                name: server.name,
                image_url: server.image_url,
                member_id: member.id,
            })
            .collect();
        Ok(Page::new(data, total, skip, limit))
    }

    pub async fn update(&self, server_id: Uuid, profile_id: Uuid, input: UpdateServer) -> Result<Server> {
        let server = require_server(self.store.as_ref(), server_id).await?;
        require_owner(&server, profile_id)?;

        let name = input.name.as_deref().map(str::trim);
        if name.is_some_and(str::is_empty) {
            return Err(AppError::Validation("Server name is required".to_string()));
        }

        self.store
            .update_server(server_id, name, input.image_url.as_deref())
            .await
    }

    pub async fn delete(&self, server_id: Uuid, profile_id: Uuid) -> Result<()> {
        let server = require_server(self.store.as_ref(), server_id).await?;
        require_owner(&server, profile_id)?;

        self.store.delete_server(server_id).await?;
        tracing::info!(%server_id, %profile_id, "Server deleted");
        Ok(())
    }

    /// The owner cannot leave; everyone else drops their membership.
    pub async fn leave(&self, server_id: Uuid, profile_id: Uuid) -> Result<()> {
        let server = require_server(self.store.as_ref(), server_id).await?;
        if server.owner_profile_id == profile_id {
            return Err(AppError::forbidden("Server owner cannot leave the server"));
        }
        let member = require_member(self.store.as_ref(), server_id, profile_id).await?;

        self.store.remove_member(member.id).await?;
        tracing::info!(%server_id, %profile_id, "Member left");
        Ok(())
    }

    /// Managers may promote or demote anyone but the owner. Ownership is never granted.
    pub async fn update_member_role(
        &self,
        server_id: Uuid,
        member_id: Uuid,
        profile_id: Uuid,
        role: MemberRole,
    ) -> Result<Member> {
        let target = self.managed_member(server_id, member_id, profile_id).await?;
        if role == MemberRole::Owner {
            return Err(AppError::forbidden("Ownership cannot be granted"));
        }

        self.store.set_member_role(target.id, role).await
    }

    pub async fn remove_member(&self, server_id: Uuid, member_id: Uuid, profile_id: Uuid) -> Result<()> {
        let target = self.managed_member(server_id, member_id, profile_id).await?;

        self.store.remove_member(target.id).await?;
        tracing::info!(%server_id, %member_id, by = %profile_id, "Member removed");
        Ok(())
    }

    /// A member of the server the caller may manage: the caller is a manager
    /// and the target is not the owner.
    async fn managed_member(&self, server_id: Uuid, member_id: Uuid, profile_id: Uuid) -> Result<Member> {
        require_server(self.store.as_ref(), server_id).await?;
        require_manager(self.store.as_ref(), server_id, profile_id).await?;

        let target = self
            .store
            .member_by_id(member_id)
            .await?
            .filter(|m| m.server_id == server_id)
            .ok_or_else(|| AppError::not_found("Member not found"))?;
        if target.role == MemberRole::Owner {
            return Err(AppError::forbidden("The server owner cannot be changed"));
        }
        Ok(target)
    }
}

fn require_owner(server: &Server, profile_id: Uuid) -> Result<()> {
    if server.owner_profile_id == profile_id {
        Ok(())
    } else {
        Err(AppError::forbidden("Only the server owner can do that"))
    }
}
