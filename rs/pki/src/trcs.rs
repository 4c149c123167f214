use cion_base_types::Isd;

use crate::certs::CertKind;
use crate::trc::{Trc, TrcError};

/// TRC state machine for a single ISD.
///
/// Holds the currently active TRC and the pending set reserved for future
/// grace-period handling. This milestone accepts exactly one base TRC per
/// ISD; any update attempt is refused with `UpdateUnsupported` so that the
/// update path can be added without changing callers.
pub struct TrcStateMachine {
    isd: Isd,
    current: Option<Trc>,
    pending: Vec<Trc>,
}

impl TrcStateMachine {
    pub fn new(isd: Isd) -> TrcStateMachine {
        TrcStateMachine { isd, current: None, pending: Vec::new() }
    }

    /// The currently active TRC.
    pub fn current(&self) -> Result<&Trc, TrcError> {
        self.current.as_ref().ok_or(TrcError::NoTrc)
    }

    /// TRCs awaiting activation. Always empty in this milestone.
    pub fn pending(&self) -> &[Trc] {
        &self.pending
    }

    /// Installs a TRC, either as the initial base TRC or as an update.
    pub fn update(&mut self, trc: Trc) -> Result<(), TrcError> {
        trc.validate()?;
        if trc.id.isd != self.isd {
            return Err(TrcError::IsdMismatch);
        }
        let Some(current) = &self.current else {
            if !trc.is_base() {
                return Err(TrcError::UpdateUnsupported);
            }
            self.current = Some(trc);
            return Ok(());
        };
        if trc.id.base != current.id.base {
            return Err(TrcError::BaseMismatch);
        }
        if trc.id.serial <= current.id.serial {
            return Err(TrcError::SerialNotIncreasing);
        }
        // A well-formed successor; verifying its votes belongs to the update
        // path, which is not available yet.
        Err(TrcError::UpdateUnsupported)
    }

    /// Root certificates of the current TRC, in TRC order.
    pub fn root_certificates(&self) -> Result<Vec<Vec<u8>>, TrcError> {
        Ok(self.current()?.certificates_of_kind(&[CertKind::Root]))
    }

    /// Sensitive and regular voting certificates of the current TRC.
    pub fn voting_certificates(&self) -> Result<Vec<Vec<u8>>, TrcError> {
        Ok(self
            .current()?
            .certificates_of_kind(&[CertKind::Sensitive, CertKind::Regular]))
    }

    /// Sensitive voting certificates of the current TRC.
    pub fn sensitive_certificates(&self) -> Result<Vec<Vec<u8>>, TrcError> {
        Ok(self.current()?.certificates_of_kind(&[CertKind::Sensitive]))
    }

    /// Regular voting certificates of the current TRC.
    pub fn regular_certificates(&self) -> Result<Vec<Vec<u8>>, TrcError> {
        Ok(self.current()?.certificates_of_kind(&[CertKind::Regular]))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use cion_base_types::{Ia, Validity};

    use crate::certs::{CertificateBundle, Role};
    use crate::generator::generate_base_trc;
    use crate::trc::Version;

    use super::*;

    fn base_trc(isd: u16, version: u64) -> Trc {
        let ia: Ia = format!("{isd}-ff00:0:110").parse().unwrap();
        let validity = Validity::for_seconds_from_now(3600);
        let mut bundle = CertificateBundle::new();
        bundle.create(ia, Role::Core, validity).unwrap();
        generate_base_trc(
            Isd(isd),
            Version(version),
            Version(version),
            "test TRC".to_string(),
            validity,
            vec![ia.asn()],
            vec![ia.asn()],
            &bundle,
        )
        .unwrap()
    }

    #[test]
    fn base_trc_is_accepted_and_becomes_current() {
        let trc = base_trc(1, 1);
        let mut machine = TrcStateMachine::new(Isd(1));
        machine.update(trc.clone()).unwrap();
        assert_eq!(machine.current().unwrap(), &trc);
        assert_eq!(machine.root_certificates().unwrap().len(), 1);
        assert_eq!(machine.voting_certificates().unwrap().len(), 2);
        assert_eq!(machine.sensitive_certificates().unwrap().len(), 1);
        assert_eq!(machine.regular_certificates().unwrap().len(), 1);
        assert!(machine.pending().is_empty());
    }

    #[test]
    fn trc_for_wrong_isd_is_rejected() {
        let trc = base_trc(1, 1);
        let mut machine = TrcStateMachine::new(Isd(2));
        assert_matches!(machine.update(trc), Err(TrcError::IsdMismatch));
        assert_matches!(machine.current(), Err(TrcError::NoTrc));
    }

    #[test]
    fn updates_are_refused() {
        let mut machine = TrcStateMachine::new(Isd(1));
        machine.update(base_trc(1, 1)).unwrap();

        let mut update = base_trc(1, 1);
        update.id.serial = Version(2);
        update.reencode().unwrap();
        assert_matches!(machine.update(update), Err(TrcError::UpdateUnsupported));
        // The current TRC is untouched.
        assert_eq!(machine.current().unwrap().id.serial, Version(1));
    }

    #[test]
    fn update_with_different_base_is_rejected() {
        let mut machine = TrcStateMachine::new(Isd(1));
        machine.update(base_trc(1, 1)).unwrap();

        let mut update = base_trc(1, 1);
        update.id.base = Version(2);
        update.id.serial = Version(3);
        update.reencode().unwrap();
        assert_matches!(machine.update(update), Err(TrcError::BaseMismatch));
    }

    #[test]
    fn update_with_stale_serial_is_rejected() {
        let mut machine = TrcStateMachine::new(Isd(1));
        machine.update(base_trc(1, 2)).unwrap();

        let mut stale = base_trc(1, 2);
        stale.id.base = Version(2);
        stale.id.serial = Version(2);
        stale.reencode().unwrap();
        assert_matches!(machine.update(stale), Err(TrcError::SerialNotIncreasing));
    }

    #[test]
    fn first_trc_must_be_base() {
        let mut non_base = base_trc(1, 1);
        non_base.id.serial = Version(2);
        non_base.reencode().unwrap();
        let mut machine = TrcStateMachine::new(Isd(1));
        assert_matches!(machine.update(non_base), Err(TrcError::UpdateUnsupported));
    }
}
