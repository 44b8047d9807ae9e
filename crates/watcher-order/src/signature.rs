//! Maker signature verification.

use alloy::primitives::{Signature, U256};
use async_trait::async_trait;
use watcher_types::{Address, OrderHash};

use crate::OrderError;

/// Length of an ECDSA signature: v(1) r(32) s(32) type(1).
const ECDSA_SIGNATURE_LENGTH: usize = 66;

/// Trailing signature type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignatureType {
	/// Signed over the raw EIP-712 order hash.
	Eip712 = 0x02,
	/// Signed over the EIP-191 personal message of the order hash.
	EthSign = 0x03,
}

impl TryFrom<u8> for SignatureType {
	type Error = OrderError;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0x02 => Ok(SignatureType::Eip712),
			0x03 => Ok(SignatureType::EthSign),
			other => Err(OrderError::InvalidSignature(format!(
				"unsupported signature type 0x{:02x}",
				other
			))),
		}
	}
}

/// Verifies that `signer` signed `order_hash`.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
	async fn verify(
		&self,
		order_hash: OrderHash,
		signer: Address,
		signature: &[u8],
	) -> Result<(), OrderError>;
}

/// [`SignatureVerifier`] for EIP-712 and EthSign ECDSA signatures.
///
/// Contract-based signature types are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaSignatureVerifier;

impl EcdsaSignatureVerifier {
	pub fn new() -> Self {
		Self
	}

	/// Recovers the address that produced `signature` over `order_hash`.
	pub fn recover(order_hash: OrderHash, signature: &[u8]) -> Result<Address, OrderError> {
		if signature.len() != ECDSA_SIGNATURE_LENGTH {
			return Err(OrderError::InvalidSignature(format!(
				"expected {} bytes, got {}",
				ECDSA_SIGNATURE_LENGTH,
				signature.len()
			)));
		}

		let signature_type = SignatureType::try_from(signature[65])?;
		let v = signature[0];
		let y_parity = match v {
			27 | 28 => v == 28,
			0 | 1 => v == 1,
			other => {
				return Err(OrderError::InvalidSignature(format!(
					"invalid recovery id {}",
					other
				)))
			}
		};
		let r = U256::from_be_slice(&signature[1..33]);
		let s = U256::from_be_slice(&signature[33..65]);
		let ecdsa = Signature::new(r, s, y_parity);

		let recovered = match signature_type {
			SignatureType::Eip712 => ecdsa.recover_address_from_prehash(&order_hash),
			SignatureType::EthSign => ecdsa.recover_address_from_msg(order_hash.as_slice()),
		};
		recovered.map_err(|e| OrderError::InvalidSignature(e.to_string()))
	}
}

#[async_trait]
impl SignatureVerifier for EcdsaSignatureVerifier {
	async fn verify(
		&self,
		order_hash: OrderHash,
		signer: Address,
		signature: &[u8],
	) -> Result<(), OrderError> {
		let recovered = Self::recover(order_hash, signature)?;
		if recovered != signer {
			return Err(OrderError::InvalidSignature(format!(
				"recovered {} but maker is {}",
				recovered, signer
			)));
		}
		Ok(())
	}
}
