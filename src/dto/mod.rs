pub mod public_dto;
