//! Console grammar expressed as a static AST.
//!
//! The parser and the help text interpret the same structure, so keywords,
//! defaults and value layouts stay in sync.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    FullPower,
    Imps,
    Bmps,
    Uapsd,
    Standby,
    Wowl,
    LowPower,
    Status,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChoiceTag {
    ReasonHost,
    ReasonQos,
    ReasonRoam,
    ReasonOther,
    UapsdStart,
    UapsdStop,
    WowlEnter,
    WowlExit,
    WowlPatterns,
    LowPowerEnter,
    LowPowerExit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSpec {
    None,
    IntegerAssignment {
        suggestions: &'static [&'static str],
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HelpTopics {
    None,
    Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub grammar: &'static Node,
    pub help: HelpTopics,
    /// Usage line shown by `help`.
    pub usage: &'static str,
    pub summary: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    End,
    OptionalChoice {
        choices: &'static [ChoiceBranch],
        default: Option<DefaultChoice>,
    },
    Topic {
        topics: HelpTopics,
        next: &'static Node,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChoiceBranch {
    pub keyword: &'static str,
    pub tag: ChoiceTag,
    pub value: ValueSpec,
    pub next: &'static Node,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DefaultChoice {
    pub tag: ChoiceTag,
    pub next: &'static Node,
}

const END: Node = Node::End;

const fn keyword(keyword: &'static str, tag: ChoiceTag) -> ChoiceBranch {
    ChoiceBranch {
        keyword,
        tag,
        value: ValueSpec::None,
        next: &END,
    }
}

const REASON_CHOICES: [ChoiceBranch; 4] = [
    keyword("host", ChoiceTag::ReasonHost),
    keyword("qos", ChoiceTag::ReasonQos),
    keyword("roam", ChoiceTag::ReasonRoam),
    keyword("other", ChoiceTag::ReasonOther),
];

const FULL_POWER_GRAMMAR: Node = Node::OptionalChoice {
    choices: &REASON_CHOICES,
    default: Some(DefaultChoice {
        tag: ChoiceTag::ReasonOther,
        next: &END,
    }),
};

const UAPSD_CHOICES: [ChoiceBranch; 2] = [
    keyword("start", ChoiceTag::UapsdStart),
    keyword("stop", ChoiceTag::UapsdStop),
];

const UAPSD_GRAMMAR: Node = Node::OptionalChoice {
    choices: &UAPSD_CHOICES,
    default: None,
};

const WOWL_PATTERN_SUGGESTIONS: [&str; 3] = ["pattern=0", "pattern=1", "pattern=2"];

const WOWL_ENTER_CHOICES: [ChoiceBranch; 1] = [ChoiceBranch {
    keyword: "pattern",
    tag: ChoiceTag::WowlPatterns,
    value: ValueSpec::IntegerAssignment {
        suggestions: &WOWL_PATTERN_SUGGESTIONS,
    },
    next: &END,
}];

const WOWL_ENTER_GRAMMAR: Node = Node::OptionalChoice {
    choices: &WOWL_ENTER_CHOICES,
    default: None,
};

const WOWL_CHOICES: [ChoiceBranch; 2] = [
    ChoiceBranch {
        keyword: "enter",
        tag: ChoiceTag::WowlEnter,
        value: ValueSpec::None,
        next: &WOWL_ENTER_GRAMMAR,
    },
    keyword("exit", ChoiceTag::WowlExit),
];

const WOWL_GRAMMAR: Node = Node::OptionalChoice {
    choices: &WOWL_CHOICES,
    default: None,
};

const LOW_POWER_CHOICES: [ChoiceBranch; 2] = [
    keyword("enter", ChoiceTag::LowPowerEnter),
    keyword("exit", ChoiceTag::LowPowerExit),
];

const LOW_POWER_GRAMMAR: Node = Node::OptionalChoice {
    choices: &LOW_POWER_CHOICES,
    default: None,
};

const HELP_GRAMMAR: Node = Node::Topic {
    topics: HelpTopics::Commands,
    next: &END,
};

const COMMANDS: [CommandSpec; 9] = [
    CommandSpec {
        name: "full-power",
        tag: CommandTag::FullPower,
        grammar: &FULL_POWER_GRAMMAR,
        help: HelpTopics::None,
        usage: "full-power [host|qos|roam|other]",
        summary: "return the radio to full power",
    },
    CommandSpec {
        name: "imps",
        tag: CommandTag::Imps,
        grammar: &END,
        help: HelpTopics::None,
        usage: "imps",
        summary: "enter idle-mode power save",
    },
    CommandSpec {
        name: "bmps",
        tag: CommandTag::Bmps,
        grammar: &END,
        help: HelpTopics::None,
        usage: "bmps",
        summary: "enter beacon-synchronized power save",
    },
    CommandSpec {
        name: "uapsd",
        tag: CommandTag::Uapsd,
        grammar: &UAPSD_GRAMMAR,
        help: HelpTopics::None,
        usage: "uapsd start|stop",
        summary: "start or stop U-APSD on top of BMPS",
    },
    CommandSpec {
        name: "standby",
        tag: CommandTag::Standby,
        grammar: &END,
        help: HelpTopics::None,
        usage: "standby",
        summary: "enter standby",
    },
    CommandSpec {
        name: "wowl",
        tag: CommandTag::Wowl,
        grammar: &WOWL_GRAMMAR,
        help: HelpTopics::None,
        usage: "wowl enter [pattern=<n>]|exit",
        summary: "enter or leave wake-on-wireless",
    },
    CommandSpec {
        name: "lowpower",
        tag: CommandTag::LowPower,
        grammar: &LOW_POWER_GRAMMAR,
        help: HelpTopics::None,
        usage: "lowpower enter|exit",
        summary: "park the radio or bring it back",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        grammar: &END,
        help: HelpTopics::None,
        usage: "status",
        summary: "show state, intents, timers and the outstanding command",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        grammar: &HELP_GRAMMAR,
        help: HelpTopics::Commands,
        usage: "help [topic]",
        summary: "list commands or describe one",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Looks up a command by its tag.
#[must_use]
pub fn command(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::FullPower => &COMMANDS[0],
        CommandTag::Imps => &COMMANDS[1],
        CommandTag::Bmps => &COMMANDS[2],
        CommandTag::Uapsd => &COMMANDS[3],
        CommandTag::Standby => &COMMANDS[4],
        CommandTag::Wowl => &COMMANDS[5],
        CommandTag::LowPower => &COMMANDS[6],
        CommandTag::Status => &COMMANDS[7],
        CommandTag::Help => &COMMANDS[8],
    }
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}
