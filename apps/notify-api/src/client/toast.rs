use crate::models::notification::Notification;

/// Tracks the newest notification the user has already been shown so each
/// one toasts at most once.
#[derive(Debug, Default, Clone)]
pub struct ToastFilter {
    last_seen: Option<String>,
    seeded: bool,
}

impl ToastFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    /// Feed a newest-first list. The first list only seeds the tracker; later
    /// lists yield their head when it differs from the tracked id.
    pub fn observe_list<'a>(&mut self, list: &'a [Notification]) -> Option<&'a Notification> {
        let newest = list.first();

        if !self.seeded {
            self.seeded = true;
            self.last_seen = newest.map(|n| n.id.clone());
            return None;
        }

        let newest = newest?;
        if self.last_seen.as_deref() == Some(newest.id.as_str()) {
            return None;
        }
        self.last_seen = Some(newest.id.clone());
        Some(newest)
    }

    /// Feed a pushed notification. Returns `true` if it has not been shown.
    pub fn observe_push(&mut self, notification: &Notification) -> bool {
        self.seeded = true;
        if self.last_seen.as_deref() == Some(notification.id.as_str()) {
            return false;
        }
        self.last_seen = Some(notification.id.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::NotificationType;

    fn n(id: &str) -> Notification {
        Notification {
            id: id.into(),
            user_id: "usr_a".into(),
            kind: NotificationType::System,
            title: "t".into(),
            message: "m".into(),
            link: None,
            read: false,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn first_list_seeds_silently() {
        let mut filter = ToastFilter::new();
        assert!(filter.observe_list(&[n("ntf_2"), n("ntf_1")]).is_none());
        assert_eq!(filter.last_seen(), Some("ntf_2"));
    }

    #[test]
    fn same_head_never_toasts_twice() {
        let mut filter = ToastFilter::new();
        filter.observe_list(&[n("ntf_1")]);

        let list = [n("ntf_2"), n("ntf_1")];
        assert_eq!(filter.observe_list(&list).map(|n| n.id.as_str()), Some("ntf_2"));
        assert!(filter.observe_list(&list).is_none());
    }

    #[test]
    fn push_then_list_with_same_head_is_one_toast() {
        let mut filter = ToastFilter::new();
        filter.observe_list(&[n("ntf_1")]);

        assert!(filter.observe_push(&n("ntf_2")));
        assert!(!filter.observe_push(&n("ntf_2")));
        assert!(filter.observe_list(&[n("ntf_2"), n("ntf_1")]).is_none());
    }

    #[test]
    fn empty_first_list_then_new_item_toasts() {
        let mut filter = ToastFilter::new();
        assert!(filter.observe_list(&[]).is_none());
        assert!(filter.observe_list(&[n("ntf_1")]).is_some());
    }
}
