use nanoid::nanoid;

/// 通知・モーダルなどクライアント側エンティティ用のIDを生成する
///
/// # 戻り値
/// 21文字のURL-safeなnanoId
pub fn generate_id() -> String {
    nanoid!()
}
