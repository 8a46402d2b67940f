/// 機能別モジュール
///
/// 認証・経費・UIの各ストアを、モデル・通信境界と合わせて機能ごとにまとめる
pub mod auth;
pub mod expenses;
pub mod ui;
