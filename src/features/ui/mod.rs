pub mod modals;
pub mod notifications;
pub mod store;

pub use modals::{Modal, ModalKind, ModalSpec, ModalStack, ModalUpdate};
pub use notifications::{
    Callback, NewNotification, Notification, NotificationAction, NotificationCenter, Severity,
};
pub use store::{SidebarState, Theme, UiChrome, UiStore};
