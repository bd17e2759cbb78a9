//! Domain identifiers (strongly-typed IDs).
//!
//! # 設計
//! Subject や Task の識別子は外部システムが割り当てる不透明な文字列です。
//! ULID のような内部生成 ID とは違い、こちらで形式を決められないため、
//! String を包む newtype として扱います。
//!
//! ## Phantom Type パターン
//! `Id<T>` というジェネリック型で共通実装を提供しつつ、
//! `T` は実行時には使わない（PhantomData）マーカー型として、
//! コンパイル時の型安全性を提供します。
//! SubjectId と TaskId は混同できません。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// IdMarker は各 ID 型のマーカー trait
///
/// Debug 表示で使う種別名（"subject", "task"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    /// Debug 表示で使う種別名（例: "subject"）
    fn kind() -> &'static str;
}

/// ジェネリック ID 型（不透明な文字列の newtype）
///
/// `T` は PhantomData で、実行時にはメモリを消費しませんが、
/// コンパイル時に型安全性を提供します。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", T::kind(), self.value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Subject（ライフサイクルを追跡される主体）のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {}

impl IdMarker for Subject {
    fn kind() -> &'static str {
        "subject"
    }
}

/// ChallengeTask（チャレンジ内の個別タスク）のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChallengeTask {}

impl IdMarker for ChallengeTask {
    fn kind() -> &'static str {
        "task"
    }
}

// ========================================
// Type Alias（使いやすさのため）
// ========================================

/// Identifier of a Subject (the entity whose lifecycle is tracked).
pub type SubjectId = Id<Subject>;

/// Identifier of a ChallengeTask (dedup key for completion reports).
pub type TaskId = Id<ChallengeTask>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let subject = SubjectId::new("alice");
        let task = TaskId::new("a");

        assert_eq!(subject.as_str(), "alice");
        assert_eq!(task.as_str(), "a");

        // Debug には種別名が入る
        assert_eq!(format!("{subject:?}"), "subject:alice");
        assert_eq!(format!("{task:?}"), "task:a");

        // The whole point: you can't accidentally mix these types.
        // (This is a compile-time property, so we just keep it as a comment.)
        // let _: SubjectId = task; // <- does not compile
    }

    #[test]
    fn display_is_the_raw_value() {
        let subject = SubjectId::new("s-42");
        assert_eq!(subject.to_string(), "s-42");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let task = TaskId::new("b");

        let serialized = serde_json::to_string(&task).unwrap();
        assert_eq!(serialized, "\"b\"");

        let back: TaskId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn ids_order_by_value() {
        // BTreeSet に入れたとき文字列順で安定して並ぶことを確認
        let a = TaskId::new("a");
        let b = TaskId::new("b");
        assert!(a < b);
    }
}
