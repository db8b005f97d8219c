//! Command identifiers and device error codes

wire_enum! {
    /// Two-byte command identifier leading every message
    pub enum Command: u16 {
        Empty = 0x0000,
        RequestData = 0x0001,
        PublicKey = 0x0003,
        Challenge = 0x0004,
        AuthorizationAuthenticator = 0x0005,
        AuthorizationData = 0x0006,
        AuthorizationId = 0x0007,
        RemoveUserAuthorization = 0x0008,
        RequestAuthorizationEntries = 0x0009,
        AuthorizationEntry = 0x000a,
        AuthorizationDatInvite = 0x000b,
        KeyturnerStates = 0x000c,
        LockAction = 0x000d,
        Status = 0x000e,
        MostRecentCommand = 0x000f,
        OpeningsClosingsSummary = 0x0010,
        BatteryReport = 0x0011,
        ErrorReport = 0x0012,
        SetConfig = 0x0013,
        RequestConfig = 0x0014,
        Config = 0x0015,
        SetSecurityPin = 0x0019,
        RequestCalibration = 0x001a,
        RequestReboot = 0x001d,
        AuthorizationIdConfirmation = 0x001e,
        AuthorizationIdInvite = 0x001f,
        VerifySecurityPin = 0x0020,
        UpdateTime = 0x0021,
        UpdateAuthorization = 0x0025,
        AuthorizationEntryCount = 0x0027,
        StartBusSignalRecording = 0x002f,
        RequestLogEntries = 0x0031,
        LogEntry = 0x0032,
        LogEntryCount = 0x0033,
        EnableLogging = 0x0034,
        SetAdvancedConfig = 0x0035,
        RequestAdvancedConfig = 0x0036,
        AdvancedConfig = 0x0037,
        AddTimeControlEntry = 0x0039,
        TimeControlEntryId = 0x003a,
        RemoveTimeControlEntry = 0x003b,
        RequestTimeControlEntries = 0x003c,
        TimeControlEntryCount = 0x003d,
        TimeControlEntry = 0x003e,
        UpdateTimeControlEntry = 0x003f,
        AddKeypadCode = 0x0041,
        KeypadCodeId = 0x0042,
        RequestKeypadCodes = 0x0043,
        KeypadCodeCount = 0x0044,
        KeypadCode = 0x0045,
        UpdateKeypadCode = 0x0046,
        RemoveKeypadCode = 0x0047,
        KeypadAction = 0x0048,
        ContinuousModeAction = 0x0057,
        SimpleLockAction = 0x0100,
    }
}

wire_enum! {
    /// Error code carried by an `ERROR_REPORT`
    pub enum ErrorCode: u8 {
        BadCrc = 0xfd,
        BadLength = 0xfe,
        Unknown = 0xff,
        PairingNotPairing = 0x10,
        PairingBadAuthenticator = 0x11,
        PairingBadParameter = 0x12,
        PairingMaxUser = 0x13,
        NotAuthorized = 0x20,
        BadPin = 0x21,
        BadNonce = 0x22,
        BadParameter = 0x23,
        InvalidAuthId = 0x24,
        Disabled = 0x25,
        RemoteNotAllowed = 0x26,
        TimeNotAllowed = 0x27,
        TooManyPinAttempts = 0x28,
        TooManyEntries = 0x29,
        CodeAlreadyExists = 0x2a,
        CodeInvalid = 0x2b,
        CodeInvalidTimeout1 = 0x2c,
        CodeInvalidTimeout2 = 0x2d,
        CodeInvalidTimeout3 = 0x2e,
        AutoUnlockTooRecent = 0x40,
        PositionUnknown = 0x41,
        MotorBlocked = 0x42,
        ClutchFailure = 0x43,
        MotorTimeout = 0x44,
        Busy = 0x45,
        Canceled = 0x46,
        NotCalibrated = 0x47,
        MotorPositionLimit = 0x48,
        MotorLowVoltage = 0x49,
        MotorPowerFailure = 0x4a,
        ClutchPowerFailure = 0x4b,
        VoltageTooLow = 0x4c,
        FirmwareUpdateNeeded = 0x4d,
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}(0x{:04x})", self.value())
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}(0x{:02x})", self.value())
    }
}
