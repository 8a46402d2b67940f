use serde::{Deserialize, Serialize};

/// ユーザーの役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Manager,
    Employee,
}

impl UserRole {
    /// 役割の階層順位（大きいほど権限が強い）
    pub fn rank(self) -> u8 {
        match self {
            UserRole::Admin => 3,
            UserRole::Manager => 2,
            UserRole::Employee => 1,
        }
    }

    /// `required`以上の役割かどうか
    pub fn satisfies(self, required: UserRole) -> bool {
        self.rank() >= required.rank()
    }
}

/// ユーザーデータモデル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// 姓名を半角スペース1つで連結したフルネーム
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// 名・姓の頭文字（大文字）
    pub fn initials(&self) -> String {
        self.first_name
            .chars()
            .next()
            .into_iter()
            .chain(self.last_name.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }
}

/// ログインリクエスト
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// ユーザー登録リクエスト
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// ログイン・登録成功時のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
}

/// トークンリフレッシュ成功時のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// 認証状態
///
/// `is_authenticated`は`user`と`token`の両方が存在する場合のみtrue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AuthState {
    /// 永続化済みスナップショットから状態を復元する
    pub fn from_persisted(persisted: PersistedAuth) -> Self {
        let mut state = Self {
            user: persisted.user,
            token: persisted.token,
            ..Self::default()
        };
        state.sync_authenticated();
        state
    }

    /// 永続化対象のフィールドだけを取り出す
    pub fn to_persisted(&self) -> PersistedAuth {
        PersistedAuth {
            user: self.user.clone(),
            token: self.token.clone(),
            is_authenticated: self.is_authenticated,
        }
    }

    /// `is_authenticated`を`user`と`token`から再計算する
    pub(crate) fn sync_authenticated(&mut self) {
        self.is_authenticated = self.user.is_some() && self.token.is_some();
    }

    pub fn role(&self) -> Option<UserRole> {
        self.user.as_ref().map(|user| user.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(UserRole::Admin)
    }

    pub fn is_manager(&self) -> bool {
        self.role() == Some(UserRole::Manager)
    }

    pub fn is_employee(&self) -> bool {
        self.role() == Some(UserRole::Employee)
    }

    /// フルネーム（未ログイン時は空文字）
    pub fn full_name(&self) -> String {
        self.user.as_ref().map(User::full_name).unwrap_or_default()
    }

    /// イニシャル（未ログイン時は空文字）
    pub fn initials(&self) -> String {
        self.user.as_ref().map(User::initials).unwrap_or_default()
    }

    /// 指定した役割以上の権限を持つかどうか
    pub fn has_role(&self, required: UserRole) -> bool {
        self.role().is_some_and(|role| role.satisfies(required))
    }

    /// 現在のユーザーの操作権限
    pub fn permissions(&self) -> Permissions {
        Permissions::for_user(self.user.as_ref())
    }
}

/// 永続化スナップショットに保存する認証情報
///
/// ローディング状態とエラーは保存しない
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAuth {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_authenticated: bool,
}

/// ユーザーの操作権限
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Permissions {
    user_id: Option<String>,
    role: Option<UserRole>,
}

impl Permissions {
    pub fn for_user(user: Option<&User>) -> Self {
        Self {
            user_id: user.map(|u| u.id.clone()),
            role: user.map(|u| u.role),
        }
    }

    fn is_admin(&self) -> bool {
        self.role == Some(UserRole::Admin)
    }

    fn is_admin_or_manager(&self) -> bool {
        matches!(self.role, Some(UserRole::Admin | UserRole::Manager))
    }

    fn owns(&self, owner_id: &str) -> bool {
        self.user_id.as_deref() == Some(owner_id)
    }

    pub fn can_create_expense(&self) -> bool {
        self.role.is_some()
    }

    pub fn can_edit_expense(&self, owner_id: &str) -> bool {
        self.owns(owner_id) || self.is_admin_or_manager()
    }

    pub fn can_delete_expense(&self, owner_id: &str) -> bool {
        self.owns(owner_id) || self.is_admin()
    }

    pub fn can_approve_expense(&self) -> bool {
        self.is_admin_or_manager()
    }

    pub fn can_reject_expense(&self) -> bool {
        self.is_admin_or_manager()
    }

    pub fn can_view_all_expenses(&self) -> bool {
        self.is_admin_or_manager()
    }

    pub fn can_manage_users(&self) -> bool {
        self.is_admin()
    }

    pub fn can_view_reports(&self) -> bool {
        self.is_admin_or_manager()
    }
}
