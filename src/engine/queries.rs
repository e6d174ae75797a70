use crate::model::*;

use super::conflict::now_ms;
use super::{Engine, EngineError};

impl Engine {
    // ── Users ────────────────────────────────────────────

    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    pub fn user_by_id(&self, id: UserId) -> Result<User, EngineError> {
        self.get_user(id)
            .ok_or(EngineError::NotFound { entity: "user", id })
    }

    // ── Bookings ─────────────────────────────────────────

    /// Fetch one booking. Visible to the booker and the item's owner only.
    pub async fn booking_by_id(
        &self,
        requester_id: UserId,
        booking_id: BookingId,
    ) -> Result<BookingInfo, EngineError> {
        let item_id = self
            .booking_to_item
            .get(&booking_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound { entity: "booking", id: booking_id })?;
        let item = self
            .get_item(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        let cal = self
            .get_calendar(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        let guard = cal.read().await;
        let rec = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound { entity: "booking", id: booking_id })?;

        if requester_id != rec.booker_id && requester_id != item.owner_id {
            return Err(EngineError::Forbidden(
                "only the booker or the item's owner may view a booking",
            ));
        }
        Ok(BookingInfo::from_record(item_id, rec))
    }

    /// Bookings made by `user_id`, filtered by state, newest start first.
    pub async fn bookings_by_booker(
        &self,
        user_id: UserId,
        state: &str,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        if !self.users.contains_key(&user_id) {
            return Err(EngineError::NotFound { entity: "user", id: user_id });
        }
        let filter = StateFilter::parse(state)
            .ok_or_else(|| EngineError::UnknownFilter(state.to_string()))?;
        self.collect_bookings(filter, |rec, _| rec.booker_id == user_id)
            .await
    }

    /// Bookings on items owned by `owner_id`, filtered by state, newest
    /// start first.
    pub async fn bookings_by_owner(
        &self,
        owner_id: UserId,
        state: &str,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        if !self.users.contains_key(&owner_id) {
            return Err(EngineError::NotFound { entity: "user", id: owner_id });
        }
        let filter = StateFilter::parse(state)
            .ok_or_else(|| EngineError::UnknownFilter(state.to_string()))?;
        self.collect_bookings(filter, |_, item| item.owner_id == owner_id)
            .await
    }

    async fn collect_bookings(
        &self,
        filter: StateFilter,
        keep: impl Fn(&BookingRecord, &Item) -> bool,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        let now = now_ms();
        let mut out = Vec::new();
        let items: Vec<Item> = self.items.iter().map(|e| e.value().clone()).collect();
        for item in items {
            let Some(cal) = self.get_calendar(item.id) else { continue };
            let guard = cal.read().await;
            for rec in &guard.bookings {
                if keep(rec, &item) && filter.matches(rec, now) {
                    out.push(BookingInfo::from_record(item.id, rec));
                }
            }
        }
        out.sort_by(|a, b| b.start.cmp(&a.start).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    // ── Items ────────────────────────────────────────────

    /// One item. Comments always; last/next APPROVED booking only when the
    /// requester owns the item.
    pub async fn item_by_id(
        &self,
        requester_id: UserId,
        item_id: ItemId,
    ) -> Result<ItemView, EngineError> {
        let item = self
            .get_item(item_id)
            .ok_or(EngineError::NotFound { entity: "item", id: item_id })?;
        let for_owner = requester_id == item.owner_id;
        Ok(self.build_item_view(item, for_owner).await)
    }

    /// All items owned by `owner_id`, with full enrichment, ordered by id.
    pub async fn items_by_owner(&self, owner_id: UserId) -> Result<Vec<ItemView>, EngineError> {
        if !self.users.contains_key(&owner_id) {
            return Err(EngineError::NotFound { entity: "user", id: owner_id });
        }
        let mut owned: Vec<Item> = self
            .items
            .iter()
            .filter(|e| e.value().owner_id == owner_id)
            .map(|e| e.value().clone())
            .collect();
        owned.sort_by_key(|i| i.id);

        let mut out = Vec::with_capacity(owned.len());
        for item in owned {
            out.push(self.build_item_view(item, true).await);
        }
        Ok(out)
    }

    /// Case-insensitive substring search over name and description.
    /// Only available items match; a blank query matches nothing.
    pub async fn search_items(&self, text: &str) -> Vec<ItemView> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut found: Vec<Item> = self
            .items
            .iter()
            .filter(|e| {
                let item = e.value();
                item.available
                    && (item.name.to_lowercase().contains(&needle)
                        || item.description.to_lowercase().contains(&needle))
            })
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|i| i.id);

        let mut out = Vec::with_capacity(found.len());
        for item in found {
            out.push(self.build_item_view(item, false).await);
        }
        out
    }

    async fn build_item_view(&self, item: Item, for_owner: bool) -> ItemView {
        let comments = self.comments_for_item(item.id);
        let (last_booking, next_booking) = if for_owner {
            self.nearest_bookings(item.id).await
        } else {
            (None, None)
        };
        ItemView { item, last_booking, next_booking, comments }
    }

    fn comments_for_item(&self, item_id: ItemId) -> Vec<CommentView> {
        self.comments
            .get(&item_id)
            .map(|list| {
                list.iter()
                    .map(|c| CommentView {
                        id: c.id,
                        text: c.text.clone(),
                        author_name: self
                            .get_user(c.author_id)
                            .map(|u| u.name)
                            .unwrap_or_default(),
                        created_at: c.created_at,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nearest APPROVED bookings around now: last ended and next to start.
    async fn nearest_bookings(
        &self,
        item_id: ItemId,
    ) -> (Option<BookingBrief>, Option<BookingBrief>) {
        let Some(cal) = self.get_calendar(item_id) else {
            return (None, None);
        };
        let now = now_ms();
        let guard = cal.read().await;
        let mut last: Option<BookingBrief> = None;
        let mut next: Option<BookingBrief> = None;
        for rec in &guard.bookings {
            if rec.status != BookingStatus::Approved {
                continue;
            }
            if rec.span.end < now && last.is_none_or(|l| rec.span.end > l.end) {
                last = Some(BookingBrief {
                    id: rec.id,
                    start: rec.span.start,
                    end: rec.span.end,
                });
            }
            if rec.span.start > now && next.is_none_or(|n| rec.span.start < n.start) {
                next = Some(BookingBrief {
                    id: rec.id,
                    start: rec.span.start,
                    end: rec.span.end,
                });
            }
        }
        (last, next)
    }

    // ── Requests ─────────────────────────────────────────

    /// Requests created by `user_id`, newest first.
    pub fn requests_by_user(&self, user_id: UserId) -> Result<Vec<RequestView>, EngineError> {
        if !self.users.contains_key(&user_id) {
            return Err(EngineError::NotFound { entity: "user", id: user_id });
        }
        Ok(self.collect_requests(|r| r.requestor_id == user_id))
    }

    /// Everyone else's requests, newest first.
    pub fn requests_of_others(&self, user_id: UserId) -> Result<Vec<RequestView>, EngineError> {
        if !self.users.contains_key(&user_id) {
            return Err(EngineError::NotFound { entity: "user", id: user_id });
        }
        Ok(self.collect_requests(|r| r.requestor_id != user_id))
    }

    pub fn request_by_id(
        &self,
        user_id: UserId,
        request_id: RequestId,
    ) -> Result<RequestView, EngineError> {
        if !self.users.contains_key(&user_id) {
            return Err(EngineError::NotFound { entity: "user", id: user_id });
        }
        let request = self
            .requests
            .get(&request_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound { entity: "request", id: request_id })?;
        Ok(self.build_request_view(request))
    }

    fn collect_requests(&self, keep: impl Fn(&ItemRequest) -> bool) -> Vec<RequestView> {
        let mut requests: Vec<ItemRequest> = self
            .requests
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| e.value().clone())
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        requests
            .into_iter()
            .map(|r| self.build_request_view(r))
            .collect()
    }

    fn build_request_view(&self, request: ItemRequest) -> RequestView {
        let mut items: Vec<ItemBrief> = self
            .items
            .iter()
            .filter(|e| e.value().request_id == Some(request.id))
            .map(|e| {
                let item = e.value();
                ItemBrief {
                    id: item.id,
                    name: item.name.clone(),
                    owner_id: item.owner_id,
                }
            })
            .collect();
        items.sort_by_key(|i| i.id);
        RequestView { request, items }
    }
}
