//! Infrastructure layer: collaborator implementations and wire DTOs.

pub mod broker;
pub mod dto;
pub mod identity;
pub mod repository;
pub mod search;
