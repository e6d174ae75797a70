use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_range};
use super::{Engine, EngineError};

impl Engine {
    // ── Users ────────────────────────────────────────────

    pub async fn create_user(&self, name: String, email: String) -> Result<User, EngineError> {
        let id = self.user_seq.next();
        // Claim the email before touching the WAL so two concurrent signups
        // with the same address cannot both pass the uniqueness check.
        match self.email_index.entry(email.clone()) {
            Entry::Occupied(_) => return Err(EngineError::EmailTaken(email)),
            Entry::Vacant(v) => {
                v.insert(id);
            }
        }

        let event = Event::UserCreated { id, name, email: email.clone() };
        if let Err(e) = self.wal_append(&event).await {
            self.email_index.remove(&email);
            return Err(e);
        }
        self.apply_store_event(&event);
        info!("created user {id}");
        Ok(self.get_user(id).expect("just inserted"))
    }

    pub async fn update_user(
        &self,
        id: UserId,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<User, EngineError> {
        if !self.users.contains_key(&id) {
            return Err(EngineError::NotFound { entity: "user", id });
        }
        if let Some(ref new_email) = email {
            // Conflict only when another user holds the address; re-sending
            // your own email is a no-op, not an error.
            match self.email_index.entry(new_email.clone()) {
                Entry::Occupied(e) if *e.get() != id => {
                    return Err(EngineError::EmailTaken(new_email.clone()));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(v) => {
                    v.insert(id);
                }
            }
        }

        let event = Event::UserUpdated { id, name, email: email.clone() };
        if let Err(e) = self.wal_append(&event).await {
            if let Some(ref new_email) = email {
                // Release the claim unless it was already the user's address.
                if self.email_index.get(new_email).is_some_and(|e| *e == id)
                    && self.get_user(id).is_none_or(|u| u.email != *new_email)
                {
                    self.email_index.remove(new_email);
                }
            }
            return Err(e);
        }
        self.apply_store_event(&event);
        info!("updated user {id}");
        Ok(self.get_user(id).expect("checked above"))
    }

    pub async fn delete_user(&self, id: UserId) -> Result<(), EngineError> {
        if !self.users.contains_key(&id) {
            return Err(EngineError::NotFound { entity: "user", id });
        }
        self.persist_and_apply(&Event::UserDeleted { id }).await?;
        info!("deleted user {id} (items cascaded)");
        Ok(())
    }

    // ── Items ────────────────────────────────────────────

    pub async fn create_item(
        &self,
        owner_id: UserId,
        name: String,
        description: String,
        available: bool,
        request_id: Option<RequestId>,
    ) -> Result<Item, EngineError> {
        if !self.users.contains_key(&owner_id) {
            return Err(EngineError::NotFound { entity: "user", id: owner_id });
        }
        if let Some(rid) = request_id
            && !self.requests.contains_key(&rid)
        {
            return Err(EngineError::NotFound { entity: "request", id: rid });
        }

        let id = self.item_seq.next();
        let event = Event::ItemCreated { id, owner_id, name, description, available, request_id };
        self.persist_and_apply(&event).await?;
        info!("created item {id} for owner {owner_id}");
        Ok(self.get_item(id).expect("just inserted"))
    }

    pub async fn update_item(
        &self,
        acting_user: UserId,
        item_id: ItemId,
        name: Option<String>,
        description: Option<String>,
        available: Option<bool>,
        request_id: Option<RequestId>,
    ) -> Result<Item, EngineError> {
        if !self.users.contains_key(&acting_user) {
            return Err(EngineError::NotFound { entity: "user", id: acting_user });
        }
        let item = self
            .get_item(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        if item.owner_id != acting_user {
            return Err(EngineError::Forbidden("only the item's owner may update it"));
        }
        if let Some(rid) = request_id
            && !self.requests.contains_key(&rid)
        {
            return Err(EngineError::NotFound { entity: "request", id: rid });
        }

        let event = Event::ItemUpdated { id: item_id, name, description, available, request_id };
        self.persist_and_apply(&event).await?;
        info!("updated item {item_id}");
        Ok(self.get_item(item_id).expect("checked above"))
    }

    pub async fn delete_item(&self, acting_user: UserId, item_id: ItemId) -> Result<(), EngineError> {
        let item = self
            .get_item(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        if item.owner_id != acting_user {
            return Err(EngineError::Forbidden("only the item's owner may delete it"));
        }
        self.persist_and_apply(&Event::ItemDeleted { id: item_id }).await?;
        info!("deleted item {item_id}");
        Ok(())
    }

    // ── Requests ─────────────────────────────────────────

    pub async fn create_request(
        &self,
        requestor_id: UserId,
        description: String,
    ) -> Result<ItemRequest, EngineError> {
        if !self.users.contains_key(&requestor_id) {
            return Err(EngineError::NotFound { entity: "user", id: requestor_id });
        }
        let id = self.request_seq.next();
        let event = Event::RequestCreated {
            id,
            requestor_id,
            description,
            created_at: now_ms(),
        };
        self.persist_and_apply(&event).await?;
        info!("created request {id} for user {requestor_id}");
        Ok(self.requests.get(&id).expect("just inserted").clone())
    }

    // ── Bookings ─────────────────────────────────────────

    /// Create a booking in WAITING. Checks, in order: temporal range, item
    /// existence, requester existence, item availability, self-booking,
    /// calendar conflict. The conflict check and the insert run under the
    /// item's calendar write lock, so two racing requests for overlapping
    /// windows cannot both commit.
    pub async fn create_booking(
        &self,
        requester_id: UserId,
        item_id: ItemId,
        start: Ms,
        end: Ms,
    ) -> Result<BookingInfo, EngineError> {
        let span = validate_range(start, end)?;
        let item = self
            .get_item(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        if !self.users.contains_key(&requester_id) {
            return Err(EngineError::NotFound { entity: "user", id: requester_id });
        }
        if !item.available {
            return Err(EngineError::NotAvailable(item_id));
        }
        if requester_id == item.owner_id {
            return Err(EngineError::SelfBooking(item_id));
        }

        let cal = self
            .get_calendar(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        let mut guard = cal.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ITEM {
            return Err(EngineError::LimitExceeded("too many bookings on item"));
        }
        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let id = self.booking_seq.next();
        let event = Event::BookingCreated { id, item_id, booker_id: requester_id, span };
        self.persist_and_apply_booking(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!("created booking {id} on item {item_id} by user {requester_id}");

        Ok(BookingInfo {
            id,
            item_id,
            booker_id: requester_id,
            start: span.start,
            end: span.end,
            status: BookingStatus::Waiting,
        })
    }

    /// Owner decision. The status check and the write run under the same
    /// calendar write guard (compare-and-swap on WAITING), so concurrent
    /// approve/reject calls cannot both succeed.
    pub async fn decide_booking(
        &self,
        acting_user: UserId,
        booking_id: BookingId,
        approve: bool,
    ) -> Result<BookingInfo, EngineError> {
        let item_id = self
            .booking_to_item
            .get(&booking_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound { entity: "booking", id: booking_id })?;
        let item = self
            .get_item(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        if acting_user != item.owner_id {
            return Err(EngineError::Forbidden("only the item's owner may decide"));
        }

        let cal = self
            .get_calendar(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        let mut guard = cal.write().await;
        let rec = guard
            .booking(booking_id)
            .copied()
            .ok_or(EngineError::NotFound { entity: "booking", id: booking_id })?;
        if rec.status != BookingStatus::Waiting {
            return Err(EngineError::AlreadyDecided(booking_id));
        }

        let event = Event::BookingDecided { id: booking_id, item_id, approved: approve };
        self.persist_and_apply_booking(&mut guard, &event).await?;
        let decision = if approve { "approved" } else { "rejected" };
        metrics::counter!(
            crate::observability::BOOKING_DECISIONS_TOTAL,
            "decision" => decision
        )
        .increment(1);
        info!("booking {booking_id} {decision} by owner {acting_user}");

        let rec = guard.booking(booking_id).expect("still present");
        Ok(BookingInfo::from_record(item_id, rec))
    }

    // ── Comments ─────────────────────────────────────────

    /// Post a comment. The author must have an APPROVED booking on the item
    /// that ended before now.
    pub async fn create_comment(
        &self,
        author_id: UserId,
        item_id: ItemId,
        text: String,
    ) -> Result<CommentView, EngineError> {
        let author = self
            .get_user(author_id)
            .ok_or(EngineError::NotFound { entity: "user", id: author_id })?;
        if !self.items.contains_key(&item_id) {
            return Err(EngineError::NotFound { entity: "item", id: item_id });
        }

        let now = now_ms();
        let cal = self
            .get_calendar(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        let eligible = {
            let guard = cal.read().await;
            guard.bookings.iter().any(|b| {
                b.booker_id == author_id
                    && b.status == BookingStatus::Approved
                    && b.span.end < now
            })
        };
        if !eligible {
            return Err(EngineError::NotEligible { author: author_id, item: item_id });
        }

        if self
            .comments
            .get(&item_id)
            .is_some_and(|c| c.len() >= MAX_COMMENTS_PER_ITEM)
        {
            return Err(EngineError::LimitExceeded("too many comments on item"));
        }

        let id = self.comment_seq.next();
        let event = Event::CommentAdded {
            id,
            item_id,
            author_id,
            text: text.clone(),
            created_at: now,
        };
        self.persist_and_apply(&event).await?;
        info!("created comment {id} on item {item_id} by user {author_id}");

        Ok(CommentView {
            id,
            text,
            author_name: author.name,
            created_at: now,
        })
    }
}
